/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::ffi::{c_char, CString};

pub mod accounts;
pub mod capability;
pub mod compose;
pub mod config;
pub mod error;
pub mod events;
mod ffi;
pub mod image_cache;
pub mod ledger;
pub mod provider;
pub mod resource;
pub mod runtime;
pub mod store;

pub use error::{ProviderError, StoreError};
pub use provider::DataProvider;
pub use roost_protocol as protocol;

#[no_mangle]
pub extern "C" fn roost_core_version() -> *mut c_char {
    CString::new(env!("CARGO_PKG_VERSION"))
        .expect("version is valid CString")
        .into_raw()
}

#[no_mangle]
pub extern "C" fn roost_core_string_free(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}
