/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use image::{imageops, Rgba, RgbaImage};
use sha2::Digest as _;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Local avatar cache, keyed by the remote URL. Never fetches anything.
pub trait ImageCache: Send + Sync {
    fn cached_file(&self, url: &str) -> Option<PathBuf>;
}

/// Files named by the sha256 of their URL inside one directory.
pub struct DirImageCache {
    dir: PathBuf,
}

impl DirImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let mut h = sha2::Sha256::new();
        h.update(url.as_bytes());
        self.dir.join(hex::encode(h.finalize()))
    }

    pub fn store(&self, url: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir.display()))?;
        let path = self.path_for(url);
        std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

impl ImageCache for DirImageCache {
    fn cached_file(&self, url: &str) -> Option<PathBuf> {
        let path = self.path_for(url);
        path.is_file().then_some(path)
    }
}

/// `..._normal.png` -> `..._bigger.png`, the larger avatar rendition.
pub fn bigger_profile_image(url: &str) -> String {
    match url.rfind("_normal.") {
        Some(idx) => format!("{}_bigger.{}", &url[..idx], &url[idx + "_normal.".len()..]),
        None => url.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LargeIcon {
    pub image: RgbaImage,
    /// True when the default avatar stands in for the sender's.
    pub fallback: bool,
}

impl LargeIcon {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Sender avatar scaled to `w`x`h`, or the default avatar on a miss or decode failure.
pub fn load_large_icon(cache: &dyn ImageCache, url: Option<&str>, w: u32, h: u32) -> LargeIcon {
    let (w, h) = (w.max(1), h.max(1));
    let decoded = url
        .and_then(|u| cache.cached_file(u))
        .and_then(|path| match decode(&path) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!(path = %path.display(), "avatar decode failed: {e:#}");
                None
            }
        });
    match decoded {
        Some(img) => LargeIcon {
            image: imageops::resize(&img, w, h, imageops::FilterType::Triangle),
            fallback: false,
        },
        None => LargeIcon {
            image: default_avatar(w, h),
            fallback: true,
        },
    }
}

fn decode(path: &Path) -> Result<RgbaImage> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let img = image::load_from_memory(&bytes).context("decode image")?;
    Ok(img.to_rgba8())
}

/// Grey tile with a lighter disc, drawn at the requested size.
pub fn default_avatar(w: u32, h: u32) -> RgbaImage {
    let bg = Rgba([0x9e, 0x9e, 0x9e, 0xff]);
    let fg = Rgba([0xe0, 0xe0, 0xe0, 0xff]);
    let (cx, cy) = (w as f32 / 2.0, h as f32 * 0.4);
    let r = w.min(h) as f32 * 0.25;
    RgbaImage::from_fn(w, h, |x, y| {
        let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
        if dx * dx + dy * dy <= r * r {
            fg
        } else {
            bg
        }
    })
}
