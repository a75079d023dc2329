/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::accounts::AccountDirectory;
use crate::resource::{content_uri, ResourceId, Route, Table};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

fn now_ms_u64() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AccountsUpdated,
    DraftsUpdated,
    /// Statuses, mentions or a direct message box changed; `resource` names which.
    ContentChanged,
    TrendsUpdated,
    TabsUpdated,
    FiltersUpdated,
    DatabaseUpdated,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub ts_ms: u64,
    pub resource: Option<String>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, resource: Option<String>) -> Self {
        Self {
            kind,
            ts_ms: now_ms_u64(),
            resource,
        }
    }
}

/// Family event for a resource, if it has one.
pub fn family_of(resource: ResourceId) -> Option<ChangeKind> {
    let table = resource.table()?;
    Some(match table {
        Table::Accounts => ChangeKind::AccountsUpdated,
        Table::Drafts => ChangeKind::DraftsUpdated,
        Table::Statuses | Table::Mentions | Table::DirectMessagesInbox | Table::DirectMessagesOutbox => {
            ChangeKind::ContentChanged
        }
        Table::TrendsLocal => ChangeKind::TrendsUpdated,
        Table::Tabs => ChangeKind::TabsUpdated,
        Table::FilteredUsers | Table::FilteredKeywords | Table::FilteredSources | Table::FilteredLinks => {
            ChangeKind::FiltersUpdated
        }
        Table::CachedUsers | Table::CachedStatuses | Table::CachedHashtags => return None,
    })
}

/// Publishes change events on the process-wide bus. Sending never fails the caller.
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
    accounts: Arc<AccountDirectory>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize, accounts: Arc<AccountDirectory>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, accounts }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Emits the family event (if any) and then `DatabaseUpdated` for a mutated table.
    /// Returns the number of events published.
    pub fn notify(&self, route: &Route) -> usize {
        if !route.notify {
            return 0;
        }
        let Some(table) = route.resource.table() else {
            return 0;
        };
        let mut sent = 0;
        if let Some(kind) = family_of(route.resource) {
            if kind == ChangeKind::AccountsUpdated {
                self.accounts.invalidate();
            }
            let resource = (kind == ChangeKind::ContentChanged).then(|| content_uri(table.name()));
            self.publish(ChangeEvent::new(kind, resource));
            sent += 1;
        }
        self.publish(ChangeEvent::new(ChangeKind::DatabaseUpdated, None));
        sent + 1
    }

    fn publish(&self, event: ChangeEvent) {
        debug!(kind = ?event.kind, resource = ?event.resource, "change event");
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}
