/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::capability::Denial;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid sort order: {0:?}")]
    InvalidSortOrder(String),
}

/// Caller-visible failure of a provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Denied(#[from] Denial),

    #[error("store failure")]
    Store(#[source] StoreError),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Denied(Denial::InsufficientCapability { .. }) => "access_denied",
            ProviderError::Denied(Denial::Forbidden { .. }) => "forbidden",
            ProviderError::Store(_) => "store_failure",
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, ProviderError::Denied(_))
    }
}

impl From<StoreError> for ProviderError {
    fn from(e: StoreError) -> Self {
        ProviderError::Store(e)
    }
}

impl From<rusqlite::Error> for ProviderError {
    fn from(e: rusqlite::Error) -> Self {
        ProviderError::Store(StoreError::Database(e))
    }
}
