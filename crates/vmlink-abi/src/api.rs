//! Native entry point table.
//!
//! A native library fills one `NativeApi` and hands it to the host, either by
//! value when linked statically or through [`GET_API_SYMBOL`] when loaded as
//! a dynamic library.

use core::ffi::{c_char, c_void};

use crate::callback::{CallbackDescriptor, DynamicData};
use crate::options::{ChunkOptions, CompilerOptions};
use crate::result::{BoolResult, Bytes, I64Result, NoneResult, PtrResult, UsizeResult, ValueResult};
use crate::value::WireValue;

/// Destructor shared by every object type.
pub type FreeFn = unsafe extern "C" fn(ptr: *mut c_void);

/// Signature of the exported table getter.
pub type GetApiFn = unsafe extern "C" fn() -> NativeApi;

/// Exported symbol name of the table getter.
pub const GET_API_SYMBOL: &[u8] = b"vmlink_get_api";

#[repr(C)]
#[derive(Clone, Copy)]
pub struct NativeApi {
    /// Must equal [`crate::ABI_VERSION`].
    pub version: u32,

    // ===== VM =====
    pub vm_new: unsafe extern "C" fn() -> *mut c_void,
    pub vm_free: FreeFn,
    pub vm_set_memory_limit: unsafe extern "C" fn(vm: *mut c_void, limit: usize) -> NoneResult,
    pub vm_set_compiler_options: unsafe extern "C" fn(vm: *mut c_void, opts: CompilerOptions),
    pub load_chunk: unsafe extern "C" fn(vm: *mut c_void, opts: ChunkOptions) -> PtrResult,

    // ===== Error messages =====
    pub error_message_new: unsafe extern "C" fn(data: *const u8, len: usize) -> *mut c_char,
    pub error_message_free: unsafe extern "C" fn(msg: *mut c_char),

    // ===== Values =====
    pub value_clone: unsafe extern "C" fn(value: WireValue) -> WireValue,
    pub value_free: unsafe extern "C" fn(value: WireValue),

    // ===== Strings =====
    pub string_new: unsafe extern "C" fn(vm: *mut c_void, data: *const u8, len: usize) -> PtrResult,
    pub string_bytes: unsafe extern "C" fn(s: *mut c_void) -> Bytes,
    pub string_to_pointer: unsafe extern "C" fn(s: *mut c_void) -> usize,
    pub string_free: FreeFn,

    // ===== Tables =====
    pub table_new: unsafe extern "C" fn(vm: *mut c_void, narr: usize, nrec: usize) -> PtrResult,
    pub table_free: FreeFn,
    pub table_clear: unsafe extern "C" fn(t: *mut c_void) -> NoneResult,
    pub table_contains_key: unsafe extern "C" fn(t: *mut c_void, key: WireValue) -> BoolResult,
    pub table_equals: unsafe extern "C" fn(t: *mut c_void, other: *mut c_void) -> BoolResult,
    pub table_get: unsafe extern "C" fn(t: *mut c_void, key: WireValue) -> ValueResult,
    pub table_raw_get: unsafe extern "C" fn(t: *mut c_void, key: WireValue) -> ValueResult,
    pub table_set: unsafe extern "C" fn(t: *mut c_void, key: WireValue, value: WireValue) -> NoneResult,
    pub table_raw_set: unsafe extern "C" fn(t: *mut c_void, key: WireValue, value: WireValue) -> NoneResult,
    pub table_len: unsafe extern "C" fn(t: *mut c_void) -> I64Result,
    pub table_raw_len: unsafe extern "C" fn(t: *mut c_void) -> usize,
    pub table_push: unsafe extern "C" fn(t: *mut c_void, value: WireValue) -> NoneResult,
    pub table_raw_push: unsafe extern "C" fn(t: *mut c_void, value: WireValue) -> NoneResult,
    pub table_pop: unsafe extern "C" fn(t: *mut c_void) -> ValueResult,
    pub table_raw_pop: unsafe extern "C" fn(t: *mut c_void) -> ValueResult,
    pub table_raw_insert: unsafe extern "C" fn(t: *mut c_void, idx: i64, value: WireValue) -> NoneResult,
    pub table_raw_remove: unsafe extern "C" fn(t: *mut c_void, key: WireValue) -> NoneResult,
    pub table_is_empty: unsafe extern "C" fn(t: *mut c_void) -> bool,
    pub table_is_readonly: unsafe extern "C" fn(t: *mut c_void) -> bool,
    pub table_set_readonly: unsafe extern "C" fn(t: *mut c_void, enabled: bool),
    pub table_set_safeenv: unsafe extern "C" fn(t: *mut c_void, enabled: bool),
    /// Owned metatable pointer, or null.
    pub table_metatable: unsafe extern "C" fn(t: *mut c_void) -> *mut c_void,
    /// `mt` is borrowed; null removes the metatable.
    pub table_set_metatable: unsafe extern "C" fn(t: *mut c_void, mt: *mut c_void) -> NoneResult,
    pub table_to_pointer: unsafe extern "C" fn(t: *mut c_void) -> usize,
    /// Invokes `cb` with a `ForEachCallbackData` per entry, then calls
    /// `cb.drop`.
    pub table_for_each: unsafe extern "C" fn(t: *mut c_void, cb: CallbackDescriptor) -> NoneResult,
    /// Invokes `cb` with a `ForEachValueCallbackData` per array element,
    /// then calls `cb.drop`.
    pub table_for_each_value: unsafe extern "C" fn(t: *mut c_void, cb: CallbackDescriptor) -> NoneResult,

    // ===== Functions =====
    /// The native side owns `cb` from here on and calls `cb.drop` when the
    /// function dies.
    pub function_new: unsafe extern "C" fn(vm: *mut c_void, cb: CallbackDescriptor) -> PtrResult,
    /// Consumes `args`; returns an owned multivalue.
    pub function_call: unsafe extern "C" fn(f: *mut c_void, args: *mut c_void) -> PtrResult,
    pub function_to_pointer: unsafe extern "C" fn(f: *mut c_void) -> usize,
    pub function_free: FreeFn,

    // ===== Multivalues =====
    pub multivalue_new: unsafe extern "C" fn(capacity: usize) -> *mut c_void,
    pub multivalue_push: unsafe extern "C" fn(mv: *mut c_void, value: WireValue),
    /// Removes the front value. Nil when empty.
    pub multivalue_pop: unsafe extern "C" fn(mv: *mut c_void) -> WireValue,
    pub multivalue_len: unsafe extern "C" fn(mv: *mut c_void) -> usize,
    pub multivalue_free: FreeFn,

    // ===== Userdata =====
    /// `mt` is borrowed and may be null.
    pub userdata_new: unsafe extern "C" fn(vm: *mut c_void, data: DynamicData, mt: *mut c_void) -> PtrResult,
    pub userdata_token: unsafe extern "C" fn(ud: *mut c_void) -> UsizeResult,
    pub userdata_free: FreeFn,

    // ===== Buffers =====
    pub buffer_new: unsafe extern "C" fn(vm: *mut c_void, data: *const u8, len: usize) -> PtrResult,
    pub buffer_len: unsafe extern "C" fn(b: *mut c_void) -> usize,
    pub buffer_read: unsafe extern "C" fn(b: *mut c_void, offset: usize, out: *mut u8, len: usize) -> NoneResult,
    pub buffer_write: unsafe extern "C" fn(b: *mut c_void, offset: usize, data: *const u8, len: usize) -> NoneResult,
    pub buffer_free: FreeFn,

    // ===== Threads =====
    /// `f` is borrowed.
    pub thread_new: unsafe extern "C" fn(vm: *mut c_void, f: *mut c_void) -> PtrResult,
    pub thread_free: FreeFn,

    // ===== Error values =====
    pub error_new: unsafe extern "C" fn(data: *const u8, len: usize) -> *mut c_void,
    pub error_message: unsafe extern "C" fn(e: *mut c_void) -> Bytes,
    pub error_free: FreeFn,
}
