/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::capability::{Capability, PermissionsManager};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_CONSUMER_KEY: &str = match option_env!("ROOST_CONSUMER_KEY") {
    Some(v) => v,
    None => "roost-builtin-consumer-key",
};

pub const DEFAULT_CONSUMER_SECRET: &str = match option_env!("ROOST_CONSUMER_SECRET") {
    Some(v) => v,
    None => "roost-builtin-consumer-secret",
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameDisplay {
    #[default]
    Both,
    Name,
    ScreenName,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enable_home_timeline: bool,
    pub enable_mentions: bool,
    pub enable_direct_messages: bool,
    pub sound: bool,
    /// Ringtone URI; the platform default when unset.
    pub ringtone: Option<String>,
    pub vibration: bool,
    pub lights: bool,
    pub light_color: u32,
    /// Hours of the day (0-23) during which notifications stay silent.
    pub quiet_hours: Vec<u8>,
    pub name_display: NameDisplay,
    /// Look up the larger avatar variant in the image cache.
    pub hires_profile_image: bool,
    pub large_icon_width: u32,
    pub large_icon_height: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enable_home_timeline: false,
            enable_mentions: true,
            enable_direct_messages: true,
            sound: false,
            ringtone: None,
            vibration: false,
            lights: false,
            light_color: 0xff0099cc,
            quiet_hours: Vec::new(),
            name_display: NameDisplay::Both,
            hires_profile_image: false,
            large_icon_width: 64,
            large_icon_height: 64,
        }
    }
}

impl NotificationConfig {
    pub fn is_quiet_hour(&self, hour: u32) -> bool {
        self.quiet_hours.iter().any(|h| *h as u32 == hour)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PermissionGrant {
    pub uid: u32,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Caller is signed with the host's key.
    #[serde(default)]
    pub trusted: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub db_file: Option<String>,
    /// Uid of the hosting process; it holds every capability.
    #[serde(default)]
    pub host_uid: Option<u32>,
    #[serde(default)]
    pub consumer_key: Option<String>,
    #[serde(default)]
    pub consumer_secret: Option<String>,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
    /// Directory of the avatar cache; `<data_dir>/images` when unset.
    #[serde(default)]
    pub image_cache_dir: Option<String>,
    /// Capacity of the change event bus.
    #[serde(default)]
    pub event_capacity: Option<usize>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            db_file: None,
            host_uid: None,
            consumer_key: None,
            consumer_secret: None,
            notifications: NotificationConfig::default(),
            permissions: Vec::new(),
            image_cache_dir: None,
            event_capacity: None,
        }
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(v) = std::env::var("ROOST_DATA_DIR") {
        return Ok(PathBuf::from(v));
    }
    let proj = ProjectDirs::from("net", "roost", "Roost")
        .context("unable to determine platform data dir")?;
    Ok(proj.data_local_dir().to_path_buf())
}

impl ProviderConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.data_dir.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => default_data_dir(),
        }
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        let file = self.db_file.as_deref().unwrap_or("roost.db");
        Ok(self.data_dir()?.join(file))
    }

    pub fn image_cache_dir(&self) -> Result<PathBuf> {
        match self.image_cache_dir.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(self.data_dir()?.join("images")),
        }
    }

    pub fn host_uid(&self) -> u32 {
        self.host_uid.unwrap_or(0)
    }

    /// Configured API key pair, falling back to the build-time pair for unset or blank values.
    pub fn credentials(&self) -> (String, String) {
        let pick = |v: &Option<String>, default: &str| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        (
            pick(&self.consumer_key, DEFAULT_CONSUMER_KEY),
            pick(&self.consumer_secret, DEFAULT_CONSUMER_SECRET),
        )
    }

    pub fn permissions_manager(&self) -> PermissionsManager {
        let pm = PermissionsManager::new(self.host_uid());
        for grant in &self.permissions {
            let mut caps = Capability::NONE;
            for name in &grant.capabilities {
                match Capability::from_name(name) {
                    Some(c) => caps = caps | c,
                    None => warn!(uid = grant.uid, capability = %name, "unknown capability in config"),
                }
            }
            pm.grant(grant.uid, caps, grant.trusted);
        }
        pm
    }
}
