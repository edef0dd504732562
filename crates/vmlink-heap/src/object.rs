//! Non-table heap objects.

use std::collections::VecDeque;
use std::ffi::{c_void, CString};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use vmlink_abi::{CallbackDescriptor, CompilerOptions, DynamicData, FunctionCallbackData, WireValue};

use crate::value::{self, HeapValue};

/// Per-VM state. Objects keep their VM alive.
#[derive(Default)]
pub struct VmState {
    /// Zero means unlimited.
    memory_limit: AtomicUsize,
    pub compiler: Mutex<CompilerOptions>,
}

impl VmState {
    pub fn set_memory_limit(&self, limit: usize) {
        self.memory_limit.store(limit, Ordering::Relaxed);
    }

    /// Reject allocations that alone exceed the memory limit. Usage is not
    /// accumulated: each allocation is checked on its own.
    pub fn reserve(&self, bytes: usize) -> Result<(), String> {
        let limit = self.memory_limit.load(Ordering::Relaxed);
        if limit != 0 && bytes > limit {
            return Err("not enough memory".into());
        }
        Ok(())
    }
}

/// Function backed by a host callback.
pub struct FunctionObj {
    vm: Arc<VmState>,
    callback: CallbackDescriptor,
}

impl FunctionObj {
    pub fn new(vm: Arc<VmState>, callback: CallbackDescriptor) -> Self {
        FunctionObj { vm, callback }
    }

    /// Call with an owned argument multivalue; returns an owned result
    /// multivalue.
    ///
    /// # Safety
    /// `args` must be an owned multivalue pointer from this heap.
    pub unsafe fn call(&self, args: *mut c_void) -> Result<*mut c_void, String> {
        let vm = value::into_raw(self.vm.clone());
        let mut data = FunctionCallbackData {
            args,
            error: std::ptr::null_mut(),
            values: std::ptr::null_mut(),
            vm,
        };
        (self.callback.invoke)(&mut data as *mut FunctionCallbackData as *mut c_void, self.callback.token);

        drop(Box::from_raw(args as *mut MultiValueObj));
        drop(value::take::<VmState>(vm));

        if !data.error.is_null() {
            let msg = CString::from_raw(data.error).to_string_lossy().into_owned();
            if !data.values.is_null() {
                drop(Box::from_raw(data.values as *mut MultiValueObj));
            }
            return Err(msg);
        }
        if data.values.is_null() {
            return Ok(MultiValueObj::new(0).into_raw());
        }
        Ok(data.values)
    }
}

impl Drop for FunctionObj {
    fn drop(&mut self) {
        unsafe { (self.callback.drop)(self.callback.token) };
    }
}

pub struct ThreadObj {
    pub function: Arc<FunctionObj>,
}

pub struct UserDataObj {
    pub data: DynamicData,
    pub metatable: Option<Arc<crate::table::TableObj>>,
}

impl Drop for UserDataObj {
    fn drop(&mut self) {
        unsafe { (self.data.drop)(self.data.token) };
    }
}

pub struct BufferObj {
    pub bytes: Mutex<Vec<u8>>,
}

impl BufferObj {
    fn range(len: usize, offset: usize, count: usize) -> Result<std::ops::Range<usize>, String> {
        match offset.checked_add(count) {
            Some(end) if end <= len => Ok(offset..end),
            _ => Err(format!("buffer access out of bounds: {}+{} > {}", offset, count, len)),
        }
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), String> {
        let bytes = self.bytes.lock();
        let range = Self::range(bytes.len(), offset, out.len())?;
        out.copy_from_slice(&bytes[range]);
        Ok(())
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), String> {
        let mut bytes = self.bytes.lock();
        let range = Self::range(bytes.len(), offset, data.len())?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }
}

pub struct ErrorObj {
    pub message: Box<[u8]>,
}

/// FIFO argument/result list. Not reference counted: one owner at a time.
pub struct MultiValueObj {
    values: Mutex<VecDeque<HeapValue>>,
}

impl MultiValueObj {
    pub fn new(capacity: usize) -> Self {
        MultiValueObj {
            values: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn into_raw(self) -> *mut c_void {
        Box::into_raw(Box::new(self)) as *mut c_void
    }

    pub fn push(&self, value: HeapValue) {
        self.values.lock().push_back(value);
    }

    pub fn pop(&self) -> WireValue {
        match self.values.lock().pop_front() {
            Some(value) => value.to_wire(),
            None => WireValue::nil(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
