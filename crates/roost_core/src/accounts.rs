/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::store::TableBackend;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_id: i64,
    pub screen_name: String,
    pub name: String,
    pub color: Option<i64>,
    pub profile_image_url: Option<String>,
}

/// Read-through cache of account display data. Dropped whenever the accounts table changes.
#[derive(Default)]
pub struct AccountDirectory {
    cache: Mutex<HashMap<i64, Option<AccountInfo>>>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, store: &dyn TableBackend, account_id: i64) -> Option<AccountInfo> {
        if let Some(hit) = self.cache.lock().unwrap().get(&account_id) {
            return hit.clone();
        }
        let info = match store.account(account_id) {
            Ok(v) => v,
            Err(e) => {
                warn!(account_id, "account lookup failed: {e:#}");
                return None;
            }
        };
        self.cache.lock().unwrap().insert(account_id, info.clone());
        info
    }

    pub fn invalidate(&self) {
        self.cache.lock().unwrap().clear();
    }
}
