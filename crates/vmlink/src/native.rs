//! Unpacking native results.

use std::ffi::{c_char, CStr};

use vmlink_abi::{NativeApi, NativeResult, NoneResult};

use crate::error::{Error, Result};

/// Copy a native error message into an owned string and release it.
pub(crate) fn take_message(api: &NativeApi, msg: *mut c_char) -> String {
    if msg.is_null() {
        return String::new();
    }
    let text = unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned();
    unsafe { (api.error_message_free)(msg) };
    text
}

pub(crate) fn check<T>(api: &NativeApi, result: NativeResult<T>) -> Result<T> {
    if result.is_err() {
        return Err(Error::Native(take_message(api, result.error)));
    }
    Ok(result.value)
}

pub(crate) fn check_none(api: &NativeApi, result: NoneResult) -> Result<()> {
    if result.is_err() {
        return Err(Error::Native(take_message(api, result.error)));
    }
    Ok(())
}
