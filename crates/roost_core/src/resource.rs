/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use http::Uri;

pub const SCHEME: &str = "content";
pub const AUTHORITY: &str = "roost.provider";
pub const QUERY_PARAM_NOTIFY: &str = "notify";

/// Concrete tables backed by the embedded store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Accounts,
    Statuses,
    Mentions,
    Drafts,
    CachedUsers,
    FilteredUsers,
    FilteredKeywords,
    FilteredSources,
    FilteredLinks,
    DirectMessagesInbox,
    DirectMessagesOutbox,
    TrendsLocal,
    Tabs,
    CachedStatuses,
    CachedHashtags,
}

impl Table {
    pub const ALL: [Table; 15] = [
        Table::Accounts,
        Table::Statuses,
        Table::Mentions,
        Table::Drafts,
        Table::CachedUsers,
        Table::FilteredUsers,
        Table::FilteredKeywords,
        Table::FilteredSources,
        Table::FilteredLinks,
        Table::DirectMessagesInbox,
        Table::DirectMessagesOutbox,
        Table::TrendsLocal,
        Table::Tabs,
        Table::CachedStatuses,
        Table::CachedHashtags,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Statuses => "statuses",
            Table::Mentions => "mentions",
            Table::Drafts => "drafts",
            Table::CachedUsers => "cached_users",
            Table::FilteredUsers => "filtered_users",
            Table::FilteredKeywords => "filtered_keywords",
            Table::FilteredSources => "filtered_sources",
            Table::FilteredLinks => "filtered_links",
            Table::DirectMessagesInbox => "messages_inbox",
            Table::DirectMessagesOutbox => "messages_outbox",
            Table::TrendsLocal => "trends_local",
            Table::Tabs => "tabs",
            Table::CachedStatuses => "cached_statuses",
            Table::CachedHashtags => "cached_hashtags",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Tables whose row count feeds the unseen badge.
    pub fn is_count_tracked(self) -> bool {
        matches!(self, Table::Statuses | Table::Mentions)
    }
}

/// What a path addresses. Every path maps to exactly one value; unknown paths map to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    None,
    Table(Table),
    /// Inbox and outbox as one computed list.
    DirectMessages,
    /// `messages_conversation/<account_id>/<partner_id>`
    Conversation,
    /// `messages_conversation_screen_name/<account_id>/<handle>`
    ConversationScreenName,
    /// `messages_conversations_entry[/<account_id>]`
    ConversationsEntry,
    /// `notifications/<category_id>`
    Notifications,
    Permissions,
    ConsumerKeySecret,
}

impl ResourceId {
    pub fn name(self) -> &'static str {
        match self {
            ResourceId::None => "none",
            ResourceId::Table(t) => t.name(),
            ResourceId::DirectMessages => "messages",
            ResourceId::Conversation => "messages_conversation",
            ResourceId::ConversationScreenName => "messages_conversation_screen_name",
            ResourceId::ConversationsEntry => "messages_conversations_entry",
            ResourceId::Notifications => "notifications",
            ResourceId::Permissions => "permissions",
            ResourceId::ConsumerKeySecret => "consumer_key_secret",
        }
    }

    pub fn table(self) -> Option<Table> {
        match self {
            ResourceId::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Read-only views composed from the direct message tables.
    pub fn is_conversation_view(self) -> bool {
        matches!(
            self,
            ResourceId::DirectMessages
                | ResourceId::Conversation
                | ResourceId::ConversationScreenName
                | ResourceId::ConversationsEntry
        )
    }
}

/// Resolves the path segments of a resource address.
pub fn resolve<S: AsRef<str>>(segments: &[S]) -> ResourceId {
    let Some(first) = segments.first() else {
        return ResourceId::None;
    };
    match first.as_ref() {
        "messages" => ResourceId::DirectMessages,
        "messages_conversation" => ResourceId::Conversation,
        "messages_conversation_screen_name" => ResourceId::ConversationScreenName,
        "messages_conversations_entry" => ResourceId::ConversationsEntry,
        "notifications" => ResourceId::Notifications,
        "permissions" => ResourceId::Permissions,
        "consumer_key_secret" => ResourceId::ConsumerKeySecret,
        other => Table::from_name(other)
            .map(ResourceId::Table)
            .unwrap_or(ResourceId::None),
    }
}

/// A parsed `content://authority/<resource>[/<segment>...][?notify=false]` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub resource: ResourceId,
    pub segments: Vec<String>,
    pub notify: bool,
    raw: String,
}

impl Route {
    /// Never fails: anything unparseable or addressed to a foreign authority routes to `None`.
    pub fn parse(input: &str) -> Self {
        let unresolved = |segments: Vec<String>, notify: bool| Route {
            resource: ResourceId::None,
            segments,
            notify,
            raw: input.to_string(),
        };
        let Ok(uri) = input.trim().parse::<Uri>() else {
            return unresolved(Vec::new(), true);
        };
        let segments = uri
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect::<Vec<_>>();
        let notify = query_param(uri.query(), QUERY_PARAM_NOTIFY).as_deref() != Some("false");
        if uri.authority().map(|a| a.as_str()) != Some(AUTHORITY) {
            return unresolved(segments, notify);
        }
        Route {
            resource: resolve(&segments),
            segments,
            notify,
            raw: input.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Address of a freshly inserted row: the path with the row id appended, query kept.
    pub fn with_appended_id(&self, row_id: i64) -> String {
        let (base, query) = match self.raw.split_once('?') {
            Some((b, q)) => (b, Some(q)),
            None => (self.raw.as_str(), None),
        };
        let mut out = format!("{}/{row_id}", base.trim_end_matches('/'));
        if let Some(q) = query {
            out.push('?');
            out.push_str(q);
        }
        out
    }
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then(|| {
                urlencoding::decode(v)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| v.to_string())
            })
        })
        .next()
}

/// Builds the canonical address of a resource, e.g. for callers and event payloads.
pub fn content_uri(path: &str) -> String {
    format!("{SCHEME}://{AUTHORITY}/{}", path.trim_start_matches('/'))
}
