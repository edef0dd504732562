//! Host callback descriptors and the scratch data passed to them.

use core::ffi::{c_char, c_void};

use crate::value::WireValue;

/// Invoke a host callback. `arg` points to callback-specific scratch data
/// that is only valid for the duration of the call.
pub type InvokeFn = unsafe extern "C" fn(arg: *mut c_void, token: usize);

/// Release a host registration. Idempotent on the host side.
pub type DropFn = unsafe extern "C" fn(token: usize);

/// A host closure as seen by native code: two trampolines and an opaque
/// token. The native side calls `drop` once it no longer needs the callback.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallbackDescriptor {
    pub invoke: InvokeFn,
    pub drop: DropFn,
    pub token: usize,
}

/// Scratch data for one table iteration step.
///
/// `key` and `value` are owned by the host once delivered. The host sets
/// `stop` to end the iteration after the current step.
#[repr(C)]
#[derive(Debug)]
pub struct ForEachCallbackData {
    pub key: WireValue,
    pub value: WireValue,
    pub stop: bool,
}

/// Scratch data for value-only iteration over the array part of a table.
#[repr(C)]
#[derive(Debug)]
pub struct ForEachValueCallbackData {
    pub value: WireValue,
    pub stop: bool,
}

/// Scratch data for a native-to-host function call.
///
/// `args` is a multivalue borrowed from the native side; the host drains it
/// but does not free it. On success the host stores a multivalue it created
/// in `values` (ownership passes to the native side). On failure the host
/// stores a message created with `error_message_new` in `error`.
/// `vm` identifies the calling VM state and is valid only during the call.
#[repr(C)]
#[derive(Debug)]
pub struct FunctionCallbackData {
    pub args: *mut c_void,
    pub error: *mut c_char,
    pub values: *mut c_void,
    pub vm: *mut c_void,
}

/// Host data attached to a userdata. Native code calls `drop(token)` when
/// the userdata is collected.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DynamicData {
    pub token: usize,
    pub drop: DropFn,
}
