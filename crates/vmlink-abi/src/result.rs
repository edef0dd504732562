//! Result structs returned by fallible entry points.
//!
//! Exactly one of `value`/`error` is meaningful: a non-null `error` means
//! the call failed and `value` must be ignored.

use core::ffi::{c_char, c_void};

use crate::value::WireValue;

/// Result carrying a `T` on success.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeResult<T> {
    pub value: T,
    pub error: *mut c_char,
}

/// Result of an entry point with no success value.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NoneResult {
    pub error: *mut c_char,
}

pub type PtrResult = NativeResult<*mut c_void>;
pub type ValueResult = NativeResult<WireValue>;
pub type BoolResult = NativeResult<bool>;
pub type I64Result = NativeResult<i64>;
pub type UsizeResult = NativeResult<usize>;

impl<T> NativeResult<T> {
    pub fn ok(value: T) -> Self {
        NativeResult { value, error: core::ptr::null_mut() }
    }

    pub fn is_err(&self) -> bool {
        !self.error.is_null()
    }
}

impl NoneResult {
    pub fn ok() -> Self {
        NoneResult { error: core::ptr::null_mut() }
    }

    pub fn is_err(&self) -> bool {
        !self.error.is_null()
    }
}

/// Borrowed byte view into native memory. Valid while the owning object is
/// alive and not mutated.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Bytes {
    pub data: *const u8,
    pub len: usize,
}

impl Bytes {
    pub fn empty() -> Self {
        Bytes { data: core::ptr::null(), len: 0 }
    }

    /// # Safety
    /// `data` must point to `len` readable bytes for the returned lifetime.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.data.is_null() || self.len == 0 {
            &[]
        } else {
            core::slice::from_raw_parts(self.data, self.len)
        }
    }
}
