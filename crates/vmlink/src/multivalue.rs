//! Native-owned ordered sequence of values used for call arguments and
//! results.

use std::ffi::c_void;
use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;
use crate::vm::Vm;

/// FIFO sequence of values living on the native side.
///
/// Values are converted on [`push`](MultiValue::push) and moved out on
/// [`pop`](MultiValue::pop). An owned multivalue is freed on drop together
/// with anything still inside it.
pub struct MultiValue {
    vm: Vm,
    ptr: *mut c_void,
    owned: bool,
}

impl MultiValue {
    pub(crate) fn with_capacity(vm: &Vm, capacity: usize) -> Result<Self> {
        let ptr = unsafe { (vm.api().multivalue_new)(capacity) };
        if ptr.is_null() {
            return Err(Error::Native("failed to allocate multivalue".into()));
        }
        Ok(MultiValue {
            vm: vm.clone(),
            ptr,
            owned: true,
        })
    }

    /// Build a multivalue holding `values` in order.
    pub fn from_values(vm: &Vm, values: &[Value]) -> Result<Self> {
        let mut mv = Self::with_capacity(vm, values.len())?;
        for value in values {
            mv.push(value)?;
        }
        Ok(mv)
    }

    /// Take ownership of a multivalue returned by the native side.
    ///
    /// # Safety
    /// `ptr` must be an owned, non-null multivalue pointer.
    pub(crate) unsafe fn from_raw(vm: &Vm, ptr: *mut c_void) -> Self {
        MultiValue {
            vm: vm.clone(),
            ptr,
            owned: true,
        }
    }

    /// View a multivalue the native side keeps ownership of.
    ///
    /// # Safety
    /// `ptr` must stay valid for the lifetime of the view.
    pub(crate) unsafe fn borrowed(vm: &Vm, ptr: *mut c_void) -> Self {
        MultiValue {
            vm: vm.clone(),
            ptr,
            owned: false,
        }
    }

    pub fn push(&mut self, value: &Value) -> Result<()> {
        let wire = self.vm.value_to_wire(value)?;
        unsafe { (self.vm.api().multivalue_push)(self.ptr, wire) };
        Ok(())
    }

    /// Remove and return the front value; `Nil` when empty.
    pub fn pop(&mut self) -> Value {
        let wire = unsafe { (self.vm.api().multivalue_pop)(self.ptr) };
        self.vm.value_from_wire(wire)
    }

    pub fn len(&self) -> usize {
        unsafe { (self.vm.api().multivalue_len)(self.ptr) }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every value in order.
    pub fn into_values(mut self) -> Vec<Value> {
        let n = self.len();
        (0..n).map(|_| self.pop()).collect()
    }

    /// Hand the multivalue to a consuming native call.
    pub(crate) fn into_raw(mut self) -> *mut c_void {
        self.owned = false;
        self.ptr
    }
}

impl Drop for MultiValue {
    fn drop(&mut self) {
        if self.owned {
            unsafe { (self.vm.api().multivalue_free)(self.ptr) };
        }
    }
}

impl fmt::Debug for MultiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MultiValue({:p}, len = {})", self.ptr, self.len())
    }
}
