//! Handle-backed VM objects.
//!
//! Every wrapper is a thin newtype over [`ObjectRef`]: the owning VM plus a
//! shared [`Handle`]. Cloning a wrapper shares the handle, so closing any
//! clone closes the object for all of them.

use std::fmt;
use std::sync::Arc;

use vmlink_abi::{NativeApi, Tag, WireValue};

use crate::error::{Error, Result};
use crate::handle::{Handle, HandleGuard};
use crate::vm::Vm;

mod buffer;
mod error_value;
pub(crate) mod function;
mod string;
mod table;
mod thread;
mod userdata;

pub use buffer::Buffer;
pub use error_value::ScriptError;
pub use function::Function;
pub use string::VmString;
pub use table::Table;
pub use thread::Thread;
pub use userdata::UserData;

#[derive(Clone)]
pub(crate) struct ObjectRef {
    vm: Vm,
    handle: Arc<Handle>,
}

impl ObjectRef {
    pub(crate) fn new(vm: Vm, handle: Handle) -> Self {
        ObjectRef {
            vm,
            handle: Arc::new(handle),
        }
    }

    #[inline]
    pub(crate) fn vm(&self) -> &Vm {
        &self.vm
    }

    #[inline]
    pub(crate) fn api(&self) -> &NativeApi {
        self.vm.api()
    }

    #[inline]
    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    #[inline]
    pub(crate) fn acquire(&self) -> Result<HandleGuard<'_>> {
        self.handle.acquire()
    }

    pub(crate) fn same_handle(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }

    pub(crate) fn close(&self) -> Result<()> {
        self.handle.close()
    }

    /// Owned wire copy of this object, produced under a read lock: the
    /// direct pointer is cloned through the native clone entry point.
    pub(crate) fn to_wire(&self, tag: Tag) -> Result<WireValue> {
        let guard = self.acquire().map_err(|err| match err {
            Error::ClosedHandle { kind } => Error::Conversion(format!("cannot convert closed {}", kind)),
            other => other,
        })?;
        let direct = WireValue::object(tag, guard.pointer());
        Ok(unsafe { (self.api().value_clone)(direct) })
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.handle.fmt(f)
    }
}
