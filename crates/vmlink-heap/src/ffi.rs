//! `extern "C"` entry points.
//!
//! Pointers handed out are `Box<Arc<T>>` references (see [`crate::value`]);
//! multivalues are plain boxes. Errors are returned as `CString`s released
//! by [`error_message_free`].
//!
//! Metamethods other than `__index` are not evaluated, so the plain and raw
//! variants of set, push, pop and len share one implementation.

use std::ffi::{c_char, c_void, CString};
use std::sync::Arc;

use parking_lot::Mutex;
use vmlink_abi::{
    BoolResult, Bytes, CallbackDescriptor, ChunkOptions, CompilerOptions, DynamicData, ForEachCallbackData,
    ForEachValueCallbackData, I64Result, NativeApi, NativeResult, NoneResult, PtrResult, UsizeResult, ValueResult,
    WireValue, ABI_VERSION,
};

use crate::object::{BufferObj, ErrorObj, FunctionObj, MultiValueObj, ThreadObj, UserDataObj, VmState};
use crate::table::TableObj;
use crate::value::{borrow, into_raw, take, HeapValue};

// ===== Result helpers =====

fn message(msg: impl Into<Vec<u8>>) -> *mut c_char {
    let mut bytes = msg.into();
    bytes.retain(|b| *b != 0);
    CString::new(bytes).map_or(std::ptr::null_mut(), CString::into_raw)
}

fn result<T>(r: Result<T, String>, fallback: T) -> NativeResult<T> {
    match r {
        Ok(value) => NativeResult::ok(value),
        Err(err) => NativeResult { value: fallback, error: message(err) },
    }
}

fn none(r: Result<(), String>) -> NoneResult {
    match r {
        Ok(()) => NoneResult::ok(),
        Err(err) => NoneResult { error: message(err) },
    }
}

fn value_result(r: Result<HeapValue, String>) -> ValueResult {
    result(r.map(|v| v.to_wire()), WireValue::nil())
}

fn ptr_result(r: Result<*mut c_void, String>) -> PtrResult {
    result(r, std::ptr::null_mut())
}

unsafe fn slice<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len)
    }
}

unsafe fn table<'a>(t: *mut c_void) -> &'a Arc<TableObj> {
    borrow::<TableObj>(t)
}

unsafe fn vm_state<'a>(vm: *mut c_void) -> &'a Arc<VmState> {
    borrow::<VmState>(vm)
}

// ===== VM =====

unsafe extern "C" fn vm_new() -> *mut c_void {
    into_raw(Arc::new(VmState::default()))
}

unsafe extern "C" fn vm_free(vm: *mut c_void) {
    drop(take::<VmState>(vm));
}

unsafe extern "C" fn vm_set_memory_limit(vm: *mut c_void, limit: usize) -> NoneResult {
    vm_state(vm).set_memory_limit(limit);
    NoneResult::ok()
}

unsafe extern "C" fn vm_set_compiler_options(vm: *mut c_void, opts: CompilerOptions) {
    *vm_state(vm).compiler.lock() = opts;
}

unsafe extern "C" fn load_chunk(_vm: *mut c_void, opts: ChunkOptions) -> PtrResult {
    let name = String::from_utf8_lossy(slice(opts.name, opts.name_len)).into_owned();
    let name = if name.is_empty() { "chunk".to_string() } else { name };
    let r = if opts.mode > ChunkOptions::MODE_BINARY {
        Err(format!("{}: invalid chunk mode {}", name, opts.mode))
    } else if opts.code_len == 0 {
        Err(format!("{}: chunk is empty", name))
    } else {
        Err(format!("{}: chunk compilation is not available in the reference heap", name))
    };
    ptr_result(r)
}

// ===== Error messages =====

unsafe extern "C" fn error_message_new(data: *const u8, len: usize) -> *mut c_char {
    message(slice(data, len).to_vec())
}

unsafe extern "C" fn error_message_free(msg: *mut c_char) {
    if !msg.is_null() {
        drop(CString::from_raw(msg));
    }
}

// ===== Values =====

unsafe extern "C" fn value_clone(value: WireValue) -> WireValue {
    HeapValue::peek(value).to_wire()
}

unsafe extern "C" fn value_free(value: WireValue) {
    drop(HeapValue::from_wire(value));
}

// ===== Strings =====

unsafe extern "C" fn string_new(_vm: *mut c_void, data: *const u8, len: usize) -> PtrResult {
    ptr_result(Ok(into_raw::<[u8]>(Arc::from(slice(data, len)))))
}

unsafe extern "C" fn string_bytes(s: *mut c_void) -> Bytes {
    let s = borrow::<[u8]>(s);
    Bytes { data: s.as_ptr(), len: s.len() }
}

unsafe extern "C" fn string_to_pointer(s: *mut c_void) -> usize {
    Arc::as_ptr(borrow::<[u8]>(s)) as *const u8 as usize
}

unsafe extern "C" fn string_free(s: *mut c_void) {
    drop(take::<[u8]>(s));
}

// ===== Tables =====

unsafe extern "C" fn table_new(vm: *mut c_void, narr: usize, nrec: usize) -> PtrResult {
    let bytes = narr.saturating_add(nrec).saturating_mul(std::mem::size_of::<HeapValue>());
    ptr_result(
        vm_state(vm)
            .reserve(bytes)
            .map(|()| into_raw(Arc::new(TableObj::new(narr, nrec)))),
    )
}

unsafe extern "C" fn table_free(t: *mut c_void) {
    drop(take::<TableObj>(t));
}

unsafe extern "C" fn table_clear(t: *mut c_void) -> NoneResult {
    none(table(t).clear())
}

unsafe extern "C" fn table_contains_key(t: *mut c_void, key: WireValue) -> BoolResult {
    result(table(t).contains_key(&HeapValue::from_wire(key)), false)
}

unsafe extern "C" fn table_equals(t: *mut c_void, other: *mut c_void) -> BoolResult {
    NativeResult::ok(Arc::ptr_eq(table(t), table(other)))
}

unsafe extern "C" fn table_get(t: *mut c_void, key: WireValue) -> ValueResult {
    value_result(table(t).get(&HeapValue::from_wire(key)))
}

unsafe extern "C" fn table_raw_get(t: *mut c_void, key: WireValue) -> ValueResult {
    value_result(Ok(table(t).raw_get(&HeapValue::from_wire(key))))
}

unsafe extern "C" fn table_raw_set(t: *mut c_void, key: WireValue, value: WireValue) -> NoneResult {
    none(table(t).raw_set(HeapValue::from_wire(key), HeapValue::from_wire(value)))
}

unsafe extern "C" fn table_len(t: *mut c_void) -> I64Result {
    NativeResult::ok(table(t).raw_len() as i64)
}

unsafe extern "C" fn table_raw_len(t: *mut c_void) -> usize {
    table(t).raw_len()
}

unsafe extern "C" fn table_push(t: *mut c_void, value: WireValue) -> NoneResult {
    none(table(t).push(HeapValue::from_wire(value)))
}

unsafe extern "C" fn table_pop(t: *mut c_void) -> ValueResult {
    value_result(table(t).pop())
}

unsafe extern "C" fn table_raw_insert(t: *mut c_void, idx: i64, value: WireValue) -> NoneResult {
    none(table(t).raw_insert(idx, HeapValue::from_wire(value)))
}

unsafe extern "C" fn table_raw_remove(t: *mut c_void, key: WireValue) -> NoneResult {
    none(table(t).raw_remove(&HeapValue::from_wire(key)))
}

unsafe extern "C" fn table_is_empty(t: *mut c_void) -> bool {
    table(t).is_empty()
}

unsafe extern "C" fn table_is_readonly(t: *mut c_void) -> bool {
    table(t).is_readonly()
}

unsafe extern "C" fn table_set_readonly(t: *mut c_void, enabled: bool) {
    table(t).set_readonly(enabled)
}

unsafe extern "C" fn table_set_safeenv(t: *mut c_void, enabled: bool) {
    table(t).set_safeenv(enabled)
}

unsafe extern "C" fn table_metatable(t: *mut c_void) -> *mut c_void {
    table(t).metatable().map_or(std::ptr::null_mut(), into_raw)
}

unsafe extern "C" fn table_set_metatable(t: *mut c_void, mt: *mut c_void) -> NoneResult {
    let mt = if mt.is_null() { None } else { Some(table(mt).clone()) };
    none(table(t).set_metatable(mt))
}

unsafe extern "C" fn table_to_pointer(t: *mut c_void) -> usize {
    Arc::as_ptr(table(t)) as usize
}

unsafe extern "C" fn table_for_each(t: *mut c_void, cb: CallbackDescriptor) -> NoneResult {
    // Snapshot first: the callback may modify the table.
    for (key, value) in table(t).entries() {
        let mut data = ForEachCallbackData {
            key: key.to_wire(),
            value: value.to_wire(),
            stop: false,
        };
        (cb.invoke)(&mut data as *mut ForEachCallbackData as *mut c_void, cb.token);
        // Anything the host did not take is still ours.
        value_free(std::mem::take(&mut data.key));
        value_free(std::mem::take(&mut data.value));
        if data.stop {
            break;
        }
    }
    (cb.drop)(cb.token);
    NoneResult::ok()
}

unsafe extern "C" fn table_for_each_value(t: *mut c_void, cb: CallbackDescriptor) -> NoneResult {
    for value in table(t).array_values() {
        let mut data = ForEachValueCallbackData {
            value: value.to_wire(),
            stop: false,
        };
        (cb.invoke)(&mut data as *mut ForEachValueCallbackData as *mut c_void, cb.token);
        value_free(std::mem::take(&mut data.value));
        if data.stop {
            break;
        }
    }
    (cb.drop)(cb.token);
    NoneResult::ok()
}

// ===== Functions =====

unsafe extern "C" fn function_new(vm: *mut c_void, cb: CallbackDescriptor) -> PtrResult {
    ptr_result(Ok(into_raw(Arc::new(FunctionObj::new(vm_state(vm).clone(), cb)))))
}

unsafe extern "C" fn function_call(f: *mut c_void, args: *mut c_void) -> PtrResult {
    let args = if args.is_null() { MultiValueObj::new(0).into_raw() } else { args };
    ptr_result(borrow::<FunctionObj>(f).call(args))
}

unsafe extern "C" fn function_to_pointer(f: *mut c_void) -> usize {
    Arc::as_ptr(borrow::<FunctionObj>(f)) as usize
}

unsafe extern "C" fn function_free(f: *mut c_void) {
    drop(take::<FunctionObj>(f));
}

// ===== Multivalues =====

unsafe fn multivalue<'a>(mv: *mut c_void) -> &'a MultiValueObj {
    &*(mv as *const MultiValueObj)
}

unsafe extern "C" fn multivalue_new(capacity: usize) -> *mut c_void {
    MultiValueObj::new(capacity).into_raw()
}

unsafe extern "C" fn multivalue_push(mv: *mut c_void, value: WireValue) {
    multivalue(mv).push(HeapValue::from_wire(value))
}

unsafe extern "C" fn multivalue_pop(mv: *mut c_void) -> WireValue {
    multivalue(mv).pop()
}

unsafe extern "C" fn multivalue_len(mv: *mut c_void) -> usize {
    multivalue(mv).len()
}

unsafe extern "C" fn multivalue_free(mv: *mut c_void) {
    drop(Box::from_raw(mv as *mut MultiValueObj));
}

// ===== Userdata =====

unsafe extern "C" fn userdata_new(_vm: *mut c_void, data: DynamicData, mt: *mut c_void) -> PtrResult {
    let metatable = if mt.is_null() { None } else { Some(table(mt).clone()) };
    ptr_result(Ok(into_raw(Arc::new(UserDataObj { data, metatable }))))
}

unsafe extern "C" fn userdata_token(ud: *mut c_void) -> UsizeResult {
    NativeResult::ok(borrow::<UserDataObj>(ud).data.token)
}

unsafe extern "C" fn userdata_free(ud: *mut c_void) {
    drop(take::<UserDataObj>(ud));
}

// ===== Buffers =====

unsafe extern "C" fn buffer_new(vm: *mut c_void, data: *const u8, len: usize) -> PtrResult {
    ptr_result(vm_state(vm).reserve(len).map(|()| {
        into_raw(Arc::new(BufferObj {
            bytes: Mutex::new(slice(data, len).to_vec()),
        }))
    }))
}

unsafe extern "C" fn buffer_len(b: *mut c_void) -> usize {
    borrow::<BufferObj>(b).bytes.lock().len()
}

unsafe extern "C" fn buffer_read(b: *mut c_void, offset: usize, out: *mut u8, len: usize) -> NoneResult {
    let out: &mut [u8] = if out.is_null() || len == 0 { &mut [] } else { std::slice::from_raw_parts_mut(out, len) };
    none(borrow::<BufferObj>(b).read(offset, out))
}

unsafe extern "C" fn buffer_write(b: *mut c_void, offset: usize, data: *const u8, len: usize) -> NoneResult {
    none(borrow::<BufferObj>(b).write(offset, slice(data, len)))
}

unsafe extern "C" fn buffer_free(b: *mut c_void) {
    drop(take::<BufferObj>(b));
}

// ===== Threads =====

unsafe extern "C" fn thread_new(_vm: *mut c_void, f: *mut c_void) -> PtrResult {
    let function = borrow::<FunctionObj>(f).clone();
    ptr_result(Ok(into_raw(Arc::new(ThreadObj { function }))))
}

unsafe extern "C" fn thread_free(t: *mut c_void) {
    drop(take::<ThreadObj>(t));
}

// ===== Error values =====

unsafe extern "C" fn error_new(data: *const u8, len: usize) -> *mut c_void {
    into_raw(Arc::new(ErrorObj {
        message: slice(data, len).into(),
    }))
}

unsafe extern "C" fn error_message(e: *mut c_void) -> Bytes {
    let e = borrow::<ErrorObj>(e);
    Bytes { data: e.message.as_ptr(), len: e.message.len() }
}

unsafe extern "C" fn error_free(e: *mut c_void) {
    drop(take::<ErrorObj>(e));
}

/// Entry point table of the reference heap.
pub fn api() -> NativeApi {
    NativeApi {
        version: ABI_VERSION,
        vm_new,
        vm_free,
        vm_set_memory_limit,
        vm_set_compiler_options,
        load_chunk,
        error_message_new,
        error_message_free,
        value_clone,
        value_free,
        string_new,
        string_bytes,
        string_to_pointer,
        string_free,
        table_new,
        table_free,
        table_clear,
        table_contains_key,
        table_equals,
        table_get,
        table_raw_get,
        table_set: table_raw_set,
        table_raw_set,
        table_len,
        table_raw_len,
        table_push,
        table_raw_push: table_push,
        table_pop,
        table_raw_pop: table_pop,
        table_raw_insert,
        table_raw_remove,
        table_is_empty,
        table_is_readonly,
        table_set_readonly,
        table_set_safeenv,
        table_metatable,
        table_set_metatable,
        table_to_pointer,
        table_for_each,
        table_for_each_value,
        function_new,
        function_call,
        function_to_pointer,
        function_free,
        multivalue_new,
        multivalue_push,
        multivalue_pop,
        multivalue_len,
        multivalue_free,
        userdata_new,
        userdata_token,
        userdata_free,
        buffer_new,
        buffer_len,
        buffer_read,
        buffer_write,
        buffer_free,
        thread_new,
        thread_free,
        error_new,
        error_message,
        error_free,
    }
}

/// Exported table getter for hosts that load this library dynamically.
#[no_mangle]
pub extern "C" fn vmlink_get_api() -> NativeApi {
    api()
}
