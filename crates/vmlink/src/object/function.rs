use vmlink_abi::{FunctionCallbackData, Tag};

use super::ObjectRef;
use crate::callback::Callback;
use crate::error::{Error, Result};
use crate::multivalue::MultiValue;
use crate::native;
use crate::value::Value;
use crate::vm::{Vm, WeakVm};

#[derive(Clone, Debug)]
pub struct Function(pub(crate) ObjectRef);

impl Function {
    pub const TAG: Tag = Tag::Function;

    /// Call the function with `args` and collect every result.
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>> {
        let guard = self.0.acquire()?;
        let vm = self.0.vm();
        let args = MultiValue::from_values(vm, args)?;
        let ret = native::check(vm.api(), unsafe {
            (vm.api().function_call)(guard.pointer(), args.into_raw())
        })?;
        if ret.is_null() {
            return Ok(Vec::new());
        }
        Ok(unsafe { MultiValue::from_raw(vm, ret) }.into_values())
    }

    /// Address of the native function, for hashing and debugging only.
    pub fn to_pointer(&self) -> Result<usize> {
        let guard = self.0.acquire()?;
        Ok(unsafe { (self.0.api().function_to_pointer)(guard.pointer()) })
    }

    pub fn close(&self) -> Result<()> {
        self.0.close()
    }
}

/// Adapt a host closure to the native function-call protocol.
///
/// Arguments are drained from the borrowed `args` multivalue; results are
/// handed over as a fresh multivalue in `values`. Failures are written to
/// `error` as a native-allocated message.
pub(crate) fn host_callback<F>(vm: WeakVm, f: F) -> Callback
where
    F: Fn(&Vm, Vec<Value>) -> Result<Vec<Value>> + Send + Sync + 'static,
{
    let sink_vm = vm.clone();
    Callback::new(move |arg| {
        let data = unsafe { &mut *(arg as *mut FunctionCallbackData) };
        let vm = vm
            .upgrade()
            .ok_or_else(|| Error::Native("function called after its vm was dropped".into()))?;
        let args = unsafe { MultiValue::borrowed(&vm, data.args) }.into_values();
        let rets = f(&vm, args)?;
        let values = MultiValue::from_values(&vm, &rets)?;
        data.values = values.into_raw();
        Ok(())
    })
    .on_error(move |arg, err| {
        let data = unsafe { &mut *(arg as *mut FunctionCallbackData) };
        let msg = err.to_string();
        data.error = match sink_vm.upgrade() {
            Some(vm) => unsafe { (vm.api().error_message_new)(msg.as_ptr(), msg.len()) },
            None => std::ptr::null_mut(),
        };
        if data.error.is_null() {
            log::warn!("could not report function error to native side: {}", msg);
        }
    })
}
