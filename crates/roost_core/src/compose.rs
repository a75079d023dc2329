/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::accounts::AccountInfo;
use crate::config::{NameDisplay, NotificationConfig};
use crate::image_cache::{bigger_profile_image, load_large_icon, ImageCache, LargeIcon};
use crate::ledger::{Category, CategorySnapshot, UnseenItem};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

const MAX_LINES: usize = 4;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestStyle {
    /// One item, expandable long text.
    BigText,
    /// Several items, one line each plus summary.
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallIcon {
    Tweet,
    Mention,
    DirectMessage,
}

/// Where tapping the notification leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTarget {
    Status { account_id: i64, status_id: i64 },
    Conversation { account_id: i64, conversation_id: i64 },
    Home { tab: Category },
}

/// Pre-filled reply offered on a single mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickReply {
    pub account_id: i64,
    pub in_reply_to_status_id: i64,
    pub in_reply_to_screen_name: String,
    pub in_reply_to_name: String,
    /// Author first, then everyone else mentioned in the text.
    pub mentions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alert {
    pub sound: Option<String>,
    pub vibrate: bool,
    pub lights: Option<u32>,
}

impl Alert {
    pub fn is_silent(&self) -> bool {
        self.sound.is_none() && !self.vibrate && self.lights.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub category: Category,
    pub ticker: String,
    pub title: String,
    pub body: String,
    pub style: DigestStyle,
    pub lines: Vec<String>,
    pub more: Option<String>,
    pub summary: Option<String>,
    /// Badge number, set when more than one item is pending.
    pub number: Option<usize>,
    pub small_icon: SmallIcon,
    pub large_icon: Option<LargeIcon>,
    pub reply: Option<QuickReply>,
    pub target: ContentTarget,
    pub alert: Alert,
    pub only_alert_once: bool,
    pub when_ms: i64,
}

impl Digest {
    pub fn id(&self) -> i32 {
        self.category.id()
    }
}

/// Platform notification shade. A digest replaces any earlier one with the same id.
pub trait NotificationSurface: Send + Sync {
    fn notify(&self, id: i32, digest: &Digest);
    fn cancel(&self, id: i32);
}

/// Surface that only logs, for headless hosts.
pub struct LogSurface;

impl NotificationSurface for LogSurface {
    fn notify(&self, id: i32, digest: &Digest) {
        tracing::info!(id, title = %digest.title, lines = digest.lines.len(), "notification posted");
    }

    fn cancel(&self, id: i32) {
        tracing::info!(id, "notification cancelled");
    }
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^A-Za-z0-9_!#$%&*@＠])[@＠]([A-Za-z0-9_]{1,20})").expect("mention pattern")
    })
}

/// Screen names mentioned in `text`, in order of appearance.
pub fn extract_mentions(text: &str) -> Vec<String> {
    mention_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Drops a leading `@me ` so the body starts with what was actually said.
pub fn strip_mention_text<'a>(text: &'a str, my_screen_name: Option<&str>) -> &'a str {
    let Some(me) = my_screen_name else {
        return text;
    };
    let prefix = format!("@{me} ");
    text.strip_prefix(prefix.as_str()).unwrap_or(text)
}

fn reply_mentions(author: &str, text: &str) -> Vec<String> {
    let mut out: Vec<String> = vec![author.to_string()];
    for name in extract_mentions(text) {
        if !out.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            out.push(name);
        }
    }
    out
}

fn others(n: usize) -> String {
    if n == 1 {
        "1 other".to_string()
    } else {
        format!("{n} others")
    }
}

fn tweets(n: u64) -> String {
    if n == 1 {
        "1 new tweet".to_string()
    } else {
        format!("{n} new tweets")
    }
}

/// Builds digests from ledger snapshots and hands them to the surface.
pub struct Composer {
    config: NotificationConfig,
    surface: Arc<dyn NotificationSurface>,
    images: Arc<dyn ImageCache>,
}

impl Composer {
    pub fn new(config: NotificationConfig, surface: Arc<dyn NotificationSurface>, images: Arc<dyn ImageCache>) -> Self {
        Self { config, surface, images }
    }

    pub fn enabled(&self, category: Category) -> bool {
        match category {
            Category::HomeTimeline => self.config.enable_home_timeline,
            Category::Mentions => self.config.enable_mentions,
            Category::DirectMessages => self.config.enable_direct_messages,
        }
    }

    /// Composes and posts the digest for `snap`. Returns it when something was posted.
    pub fn publish(
        &self,
        snap: &CategorySnapshot,
        account: &dyn Fn(i64) -> Option<AccountInfo>,
        hour: u32,
    ) -> Option<Digest> {
        if !self.enabled(snap.category) {
            return None;
        }
        let digest = self.compose(snap, account, hour)?;
        self.surface.notify(digest.id(), &digest);
        Some(digest)
    }

    pub fn cancel(&self, category: Category) {
        self.surface.cancel(category.id());
    }

    pub fn compose(
        &self,
        snap: &CategorySnapshot,
        account: &dyn Fn(i64) -> Option<AccountInfo>,
        hour: u32,
    ) -> Option<Digest> {
        if snap.is_empty() {
            return None;
        }
        let alert = self.alert(snap.audible, hour);
        if snap.category == Category::HomeTimeline {
            let message = tweets(snap.home_unseen);
            return Some(Digest {
                category: snap.category,
                ticker: "New notifications".to_string(),
                title: message.clone(),
                body: message,
                style: DigestStyle::BigText,
                lines: Vec::new(),
                more: None,
                summary: None,
                number: None,
                small_icon: SmallIcon::Tweet,
                large_icon: None,
                reply: None,
                target: ContentTarget::Home { tab: Category::HomeTimeline },
                alert,
                only_alert_once: true,
                when_ms: now_ms(),
            });
        }

        let is_mention = snap.category == Category::Mentions;
        let items = &snap.items;
        let lead = items.first()?;
        let own_handle = |account_id: i64| account(account_id).map(|a| a.screen_name);
        let display_text = |item: &UnseenItem| -> String {
            if is_mention {
                strip_mention_text(item.text_plain(), own_handle(item.account_id()).as_deref()).to_string()
            } else {
                item.text_plain().to_string()
            }
        };

        let lead_name = self.sender_label(lead);
        let title = match (is_mention, snap.screen_names.len()) {
            (true, n) if n > 1 => format!("{lead_name} and {} mentioned you", others(n - 1)),
            (true, _) => format!("{lead_name} mentioned you"),
            (false, n) if n > 1 => format!("{lead_name} and {} sent you direct messages", others(n - 1)),
            (false, _) => format!("{lead_name} sent you a direct message"),
        };
        let body = display_text(lead);

        let lines = items
            .iter()
            .take(MAX_LINES)
            .map(|item| format!("{}: {}", self.sender_label(item), display_text(item)))
            .collect::<Vec<_>>();
        let more = (items.len() > MAX_LINES).then(|| format!("+{} more", items.len() - MAX_LINES));

        let summary = snap
            .accounts
            .iter()
            .map(|id| match account(*id) {
                Some(a) if self.config.name_display == NameDisplay::ScreenName || a.name.is_empty() => {
                    format!("@{}", a.screen_name)
                }
                Some(a) => a.name,
                None => id.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let avatar_url = lead.avatar_url().map(|u| {
            if self.config.hires_profile_image {
                bigger_profile_image(u)
            } else {
                u.to_string()
            }
        });
        let large_icon = load_large_icon(
            self.images.as_ref(),
            avatar_url.as_deref(),
            self.config.large_icon_width,
            self.config.large_icon_height,
        );
        if large_icon.fallback {
            debug!(category = snap.category.id(), "using default avatar");
        }

        let single = items.len() == 1;
        let (target, reply) = match lead {
            UnseenItem::Status(s) if single => (
                ContentTarget::Status {
                    account_id: s.account_id,
                    status_id: s.status_id,
                },
                Some(QuickReply {
                    account_id: s.account_id,
                    in_reply_to_status_id: s.status_id,
                    in_reply_to_screen_name: s.screen_name.clone(),
                    in_reply_to_name: s.name.clone(),
                    mentions: reply_mentions(&s.screen_name, &s.text_plain),
                }),
            ),
            UnseenItem::DirectMessage(m) if single => (
                ContentTarget::Conversation {
                    account_id: m.account_id,
                    conversation_id: m.sender_id,
                },
                None,
            ),
            _ => (ContentTarget::Home { tab: snap.category }, None),
        };

        Some(Digest {
            category: snap.category,
            ticker: title.clone(),
            title,
            body,
            style: if single { DigestStyle::BigText } else { DigestStyle::List },
            lines,
            more,
            summary: (!summary.is_empty()).then_some(summary),
            number: (!single).then_some(items.len()),
            small_icon: if is_mention { SmallIcon::Mention } else { SmallIcon::DirectMessage },
            large_icon: Some(large_icon),
            reply,
            target,
            alert,
            only_alert_once: false,
            when_ms: now_ms(),
        })
    }

    fn sender_label(&self, item: &UnseenItem) -> String {
        if self.config.name_display == NameDisplay::ScreenName || item.sender_name().is_empty() {
            format!("@{}", item.sender_screen_name())
        } else {
            item.sender_name().to_string()
        }
    }

    fn alert(&self, audible: bool, hour: u32) -> Alert {
        if !audible || self.config.is_quiet_hour(hour) {
            return Alert::default();
        }
        Alert {
            sound: self
                .config
                .sound
                .then(|| self.config.ringtone.clone().unwrap_or_else(|| "default".to_string())),
            vibrate: self.config.vibration,
            lights: self.config.lights.then_some(self.config.light_color),
        }
    }
}
