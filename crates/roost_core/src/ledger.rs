/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::resource::Table;
use roost_protocol::Record;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Mutex;

/// Notification identity of each ledger category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    HomeTimeline,
    Mentions,
    DirectMessages,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::HomeTimeline, Category::Mentions, Category::DirectMessages];

    pub fn id(self) -> i32 {
        match self {
            Category::HomeTimeline => 1,
            Category::Mentions => 2,
            Category::DirectMessages => 3,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() as i64 == id)
    }

    /// Table whose inserts feed this category.
    pub fn for_table(table: Table) -> Option<Self> {
        match table {
            Table::Statuses => Some(Category::HomeTimeline),
            Table::Mentions => Some(Category::Mentions),
            Table::DirectMessagesInbox => Some(Category::DirectMessages),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusItem {
    pub account_id: i64,
    pub status_id: i64,
    pub screen_name: String,
    pub name: String,
    pub text_plain: String,
    pub text_html: String,
    pub source: String,
    pub profile_image_url: Option<String>,
    pub timestamp: i64,
}

impl StatusItem {
    pub fn from_record(r: &Record) -> Option<Self> {
        Some(Self {
            account_id: r.get_i64("account_id")?,
            status_id: r.get_i64("status_id").unwrap_or(0),
            screen_name: r.get_str("screen_name")?.to_string(),
            name: r.get_str("name").unwrap_or_default().to_string(),
            text_plain: r.get_str("text_plain").unwrap_or_default().to_string(),
            text_html: r.get_str("text_html").unwrap_or_default().to_string(),
            source: r.get_str("source").unwrap_or_default().to_string(),
            profile_image_url: r.get_str("profile_image_url").map(str::to_string),
            timestamp: r.get_i64("status_timestamp").unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectMessageItem {
    pub account_id: i64,
    pub message_id: i64,
    pub sender_id: i64,
    pub sender_screen_name: String,
    pub sender_name: String,
    pub text_plain: String,
    pub sender_profile_image_url: Option<String>,
    pub timestamp: i64,
}

impl DirectMessageItem {
    pub fn from_record(r: &Record) -> Option<Self> {
        Some(Self {
            account_id: r.get_i64("account_id")?,
            message_id: r.get_i64("message_id").unwrap_or(0),
            sender_id: r.get_i64("sender_id").unwrap_or(0),
            sender_screen_name: r.get_str("sender_screen_name")?.to_string(),
            sender_name: r.get_str("sender_name").unwrap_or_default().to_string(),
            text_plain: r.get_str("text_plain").unwrap_or_default().to_string(),
            sender_profile_image_url: r.get_str("sender_profile_image_url").map(str::to_string),
            timestamp: r.get_i64("message_timestamp").unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnseenItem {
    Status(StatusItem),
    DirectMessage(DirectMessageItem),
}

impl UnseenItem {
    /// Parses an inserted row for `category`; rows missing the sender or account are skipped.
    pub fn from_record(category: Category, r: &Record) -> Option<Self> {
        match category {
            Category::HomeTimeline => None,
            Category::Mentions => StatusItem::from_record(r).map(UnseenItem::Status),
            Category::DirectMessages => DirectMessageItem::from_record(r).map(UnseenItem::DirectMessage),
        }
    }

    pub fn account_id(&self) -> i64 {
        match self {
            UnseenItem::Status(s) => s.account_id,
            UnseenItem::DirectMessage(m) => m.account_id,
        }
    }

    pub fn sender_screen_name(&self) -> &str {
        match self {
            UnseenItem::Status(s) => &s.screen_name,
            UnseenItem::DirectMessage(m) => &m.sender_screen_name,
        }
    }

    pub fn sender_name(&self) -> &str {
        match self {
            UnseenItem::Status(s) => &s.name,
            UnseenItem::DirectMessage(m) => &m.sender_name,
        }
    }

    pub fn text_plain(&self) -> &str {
        match self {
            UnseenItem::Status(s) => &s.text_plain,
            UnseenItem::DirectMessage(m) => &m.text_plain,
        }
    }

    pub fn avatar_url(&self) -> Option<&str> {
        match self {
            UnseenItem::Status(s) => s.profile_image_url.as_deref(),
            UnseenItem::DirectMessage(m) => m.sender_profile_image_url.as_deref(),
        }
    }

    /// Larger is more recent.
    pub fn recency(&self) -> (i64, i64) {
        match self {
            UnseenItem::Status(s) => (s.timestamp, s.status_id),
            UnseenItem::DirectMessage(m) => (m.timestamp, m.message_id),
        }
    }
}

/// Insertion-ordered set: re-inserting a present key is a no-op.
#[derive(Debug, Clone)]
pub struct DedupList<T> {
    order: Vec<T>,
    seen: HashSet<T>,
}

impl<T> Default for DedupList<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> DedupList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the key was not present before.
    pub fn insert(&mut self, key: T) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push(key);
        true
    }

    pub fn contains(&self, key: &T) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.order.clone()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

#[derive(Debug, Default)]
struct CategoryLedger {
    items: Vec<UnseenItem>,
    screen_names: DedupList<String>,
    accounts: DedupList<i64>,
}

impl CategoryLedger {
    fn clear(&mut self) {
        self.items.clear();
        self.screen_names.clear();
        self.accounts.clear();
    }
}

/// Foreground lifecycle of the primary UI, delivered as messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    HomeStarted,
    HomeStopped,
}

/// Consistent view of one category plus the audible flag, taken under one lock.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySnapshot {
    pub category: Category,
    /// Most recent first.
    pub items: Vec<UnseenItem>,
    pub screen_names: Vec<String>,
    pub accounts: Vec<i64>,
    pub home_unseen: u64,
    pub audible: bool,
}

impl CategorySnapshot {
    pub fn is_empty(&self) -> bool {
        match self.category {
            Category::HomeTimeline => self.home_unseen == 0,
            _ => self.items.is_empty() || self.screen_names.is_empty(),
        }
    }
}

struct Inner {
    home_unseen: u64,
    mentions: CategoryLedger,
    messages: CategoryLedger,
    audible: bool,
}

impl Inner {
    fn ledger_mut(&mut self, category: Category) -> Option<&mut CategoryLedger> {
        match category {
            Category::HomeTimeline => None,
            Category::Mentions => Some(&mut self.mentions),
            Category::DirectMessages => Some(&mut self.messages),
        }
    }

    fn snapshot(&self, category: Category) -> CategorySnapshot {
        let ledger = match category {
            Category::HomeTimeline => None,
            Category::Mentions => Some(&self.mentions),
            Category::DirectMessages => Some(&self.messages),
        };
        let mut items = ledger.map(|l| l.items.clone()).unwrap_or_default();
        items.sort_by_key(|item| Reverse(item.recency()));
        CategorySnapshot {
            category,
            items,
            screen_names: ledger.map(|l| l.screen_names.to_vec()).unwrap_or_default(),
            accounts: ledger.map(|l| l.accounts.to_vec()).unwrap_or_default(),
            home_unseen: self.home_unseen,
            audible: self.audible,
        }
    }
}

/// Unseen items per category and the audible flag, behind a single mutex.
pub struct NotificationState {
    inner: Mutex<Inner>,
}

impl Default for NotificationState {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                home_unseen: 0,
                mentions: CategoryLedger::default(),
                messages: CategoryLedger::default(),
                audible: true,
            }),
        }
    }

    pub fn apply(&self, signal: LifecycleSignal) {
        let mut g = self.inner.lock().unwrap();
        g.audible = matches!(signal, LifecycleSignal::HomeStopped);
    }

    pub fn is_audible(&self) -> bool {
        self.inner.lock().unwrap().audible
    }

    /// Adds newly stored home timeline rows. Negative deltas (concurrent deletes) add nothing.
    pub fn add_home_unseen(&self, delta: i64) -> u64 {
        let mut g = self.inner.lock().unwrap();
        g.home_unseen = g.home_unseen.saturating_add(delta.max(0) as u64);
        g.home_unseen
    }

    pub fn home_unseen(&self) -> u64 {
        self.inner.lock().unwrap().home_unseen
    }

    /// Appends the items of `category` that pass `is_filtered` and returns how many were kept,
    /// together with a snapshot taken under the same lock.
    pub fn record<F>(&self, category: Category, items: Vec<UnseenItem>, is_filtered: F) -> (usize, CategorySnapshot)
    where
        F: Fn(&StatusItem) -> bool,
    {
        let kept = items
            .into_iter()
            .filter(|item| match item {
                UnseenItem::Status(s) => !is_filtered(s),
                UnseenItem::DirectMessage(_) => true,
            })
            .collect::<Vec<_>>();
        let count = kept.len();

        let mut g = self.inner.lock().unwrap();
        if let Some(ledger) = g.ledger_mut(category) {
            for item in kept {
                ledger.screen_names.insert(item.sender_screen_name().to_string());
                ledger.accounts.insert(item.account_id());
                ledger.items.push(item);
            }
        }
        (count, g.snapshot(category))
    }

    pub fn snapshot(&self, category: Category) -> CategorySnapshot {
        self.inner.lock().unwrap().snapshot(category)
    }

    pub fn clear(&self, category: Category) {
        let mut g = self.inner.lock().unwrap();
        if category == Category::HomeTimeline {
            g.home_unseen = 0;
        } else if let Some(ledger) = g.ledger_mut(category) {
            ledger.clear();
        }
    }

    pub fn reset(&self) {
        for category in Category::ALL {
            self.clear(category);
        }
    }
}
