/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::config::ProviderConfig;
use crate::runtime;
use std::ffi::{c_char, c_int, CStr, CString};

fn set_err(out_err: *mut *mut c_char, msg: String) {
    if out_err.is_null() {
        return;
    }
    let c = CString::new(msg).unwrap_or_else(|_| CString::new("ffi error").unwrap());
    unsafe {
        *out_err = c.into_raw();
    }
}

fn read_str(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().to_string()
}

#[no_mangle]
pub extern "C" fn roost_core_start(config_json: *const c_char, out_handle: *mut u64, out_err: *mut *mut c_char) -> c_int {
    if config_json.is_null() || out_handle.is_null() {
        set_err(out_err, "null argument".to_string());
        return 1;
    }
    let cfg: ProviderConfig = match serde_json::from_str(&read_str(config_json)) {
        Ok(v) => v,
        Err(e) => {
            set_err(out_err, format!("invalid config json: {e}"));
            return 2;
        }
    };
    match runtime::start(cfg) {
        Ok(handle) => {
            unsafe { *out_handle = handle; }
            0
        }
        Err(e) => {
            set_err(out_err, format!("{e:#}"));
            3
        }
    }
}

#[no_mangle]
pub extern "C" fn roost_core_stop(handle: u64, out_err: *mut *mut c_char) -> c_int {
    match runtime::stop(handle) {
        Ok(()) => 0,
        Err(e) => {
            set_err(out_err, format!("{e:#}"));
            1
        }
    }
}

/// Runs a JSON request. The response string must be released with `roost_core_free_cstring`.
#[no_mangle]
pub extern "C" fn roost_core_call(
    handle: u64,
    request_json: *const c_char,
    out_response: *mut *mut c_char,
    out_err: *mut *mut c_char,
) -> c_int {
    if request_json.is_null() || out_response.is_null() {
        set_err(out_err, "null argument".to_string());
        return 1;
    }
    match runtime::call(handle, &read_str(request_json)) {
        Ok(json) => match CString::new(json) {
            Ok(c) => {
                unsafe { *out_response = c.into_raw(); }
                0
            }
            Err(e) => {
                set_err(out_err, format!("response not representable: {e}"));
                3
            }
        },
        Err(e) => {
            set_err(out_err, format!("{e:#}"));
            2
        }
    }
}

/// `signal` is `home_started` or `home_stopped`.
#[no_mangle]
pub extern "C" fn roost_core_lifecycle(handle: u64, signal: *const c_char, out_err: *mut *mut c_char) -> c_int {
    if signal.is_null() {
        set_err(out_err, "null argument".to_string());
        return 1;
    }
    let name = read_str(signal);
    let Some(signal) = runtime::parse_lifecycle(&name) else {
        set_err(out_err, format!("unknown lifecycle signal: {name}"));
        return 2;
    };
    match runtime::lifecycle(handle, signal) {
        Ok(()) => 0,
        Err(e) => {
            set_err(out_err, format!("{e:#}"));
            3
        }
    }
}

#[no_mangle]
pub extern "C" fn roost_core_free_cstring(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}
