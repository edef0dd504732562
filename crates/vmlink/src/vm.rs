//! VM instance and object constructors.

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use vmlink_abi::{DynamicData, NativeApi};

use crate::backend::Backend;
use crate::callback::{self, ScopedToken};
use crate::error::{Error, Result};
use crate::handle::{Handle, HandleGuard};
use crate::multivalue::MultiValue;
use crate::native;
use crate::object::{function, Buffer, Function, ObjectRef, ScriptError, Table, Thread, UserData, VmString};
use crate::options::{ChunkOptions, CompilerOptions};
use crate::value::Value;

pub(crate) struct VmInner {
    backend: Arc<Backend>,
    state: Handle,
    compiler: Mutex<CompilerOptions>,
}

/// One native VM instance. Cheap to clone; clones share the instance.
///
/// Objects created by a VM keep it alive. [`Vm::close`] frees the native
/// state immediately; later operations on the VM return `ClosedHandle`.
#[derive(Clone)]
pub struct Vm {
    inner: Arc<VmInner>,
}

/// Non-owning reference held by host functions, so that a function stored
/// inside its own VM does not keep the VM alive.
#[derive(Clone)]
pub(crate) struct WeakVm(Weak<VmInner>);

impl WeakVm {
    pub(crate) fn upgrade(&self) -> Option<Vm> {
        self.0.upgrade().map(|inner| Vm { inner })
    }
}

impl Vm {
    pub fn new(backend: Arc<Backend>) -> Result<Self> {
        let api = backend.api();
        let raw = unsafe { (api.vm_new)() };
        let state = unsafe { Handle::from_raw(raw, api.vm_free, "vm") }
            .ok_or_else(|| Error::Native("failed to create vm".into()))?;
        log::debug!("created vm {:p}", raw);
        Ok(Vm {
            inner: Arc::new(VmInner {
                backend,
                state,
                compiler: Mutex::new(CompilerOptions::default()),
            }),
        })
    }

    #[inline]
    pub fn api(&self) -> &NativeApi {
        self.inner.backend.api()
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.inner.backend
    }

    pub(crate) fn downgrade(&self) -> WeakVm {
        WeakVm(Arc::downgrade(&self.inner))
    }

    pub(crate) fn state(&self) -> Result<HandleGuard<'_>> {
        self.inner.state.acquire()
    }

    /// Do both values refer to the same VM instance?
    pub fn ptr_eq(&self, other: &Vm) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn close(&self) -> Result<()> {
        self.inner.state.close()?;
        log::debug!("closed vm");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }

    /// Limit native allocations to `limit` bytes; 0 removes the limit.
    ///
    /// Enforcement is up to the backend. The reference heap checks each
    /// allocation against the limit on its own and does not track a running
    /// total.
    pub fn set_memory_limit(&self, limit: usize) -> Result<()> {
        let state = self.state()?;
        native::check_none(self.api(), unsafe { (self.api().vm_set_memory_limit)(state.pointer(), limit) })
    }

    /// Compiler options used by [`Vm::load`] unless a chunk overrides them.
    pub fn set_compiler_options(&self, opts: CompilerOptions) -> Result<()> {
        let state = self.state()?;
        unsafe { (self.api().vm_set_compiler_options)(state.pointer(), opts.to_raw()) };
        *self.inner.compiler.lock() = opts;
        Ok(())
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        *self.inner.compiler.lock()
    }

    /// Wrap an owned object pointer returned by a native constructor.
    pub(crate) fn wrap(&self, ptr: *mut c_void, free: vmlink_abi::FreeFn, kind: &'static str) -> Result<ObjectRef> {
        let handle = unsafe { Handle::from_raw(ptr, free, kind) }
            .ok_or_else(|| Error::Native(format!("native {} constructor returned null", kind)))?;
        Ok(ObjectRef::new(self.clone(), handle))
    }

    // ===== Constructors =====

    pub fn create_string(&self, bytes: impl AsRef<[u8]>) -> Result<VmString> {
        let ptr = self.new_string_raw(bytes.as_ref())?;
        Ok(VmString(self.wrap(ptr, self.api().string_free, "string")?))
    }

    /// Create a native string and return the owned raw pointer.
    pub(crate) fn new_string_raw(&self, bytes: &[u8]) -> Result<*mut c_void> {
        let state = self.state()?;
        native::check(self.api(), unsafe {
            (self.api().string_new)(state.pointer(), bytes.as_ptr(), bytes.len())
        })
    }

    pub fn create_table(&self) -> Result<Table> {
        self.create_table_with_capacity(0, 0)
    }

    /// Preallocate `narr` array slots and `nrec` hash slots. Fails when the
    /// request exceeds the memory limit.
    pub fn create_table_with_capacity(&self, narr: usize, nrec: usize) -> Result<Table> {
        let state = self.state()?;
        let ptr = native::check(self.api(), unsafe { (self.api().table_new)(state.pointer(), narr, nrec) })?;
        Ok(Table(self.wrap(ptr, self.api().table_free, "table")?))
    }

    /// Create a function backed by a host closure.
    ///
    /// The closure runs on whichever thread calls the function. Errors it
    /// returns, and panics it raises, surface as errors to the caller.
    pub fn create_function<F>(&self, f: F) -> Result<Function>
    where
        F: Fn(&Vm, Vec<Value>) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        let token = callback::register_callback(function::host_callback(self.downgrade(), f), None);
        // Released here if the native side never takes ownership.
        let scoped = ScopedToken::new(token);
        let state = self.state()?;
        let ptr = native::check(self.api(), unsafe {
            (self.api().function_new)(state.pointer(), scoped.descriptor())
        })?;
        // The native function now owns the token and drops it when it dies.
        std::mem::forget(scoped);
        Ok(Function(self.wrap(ptr, self.api().function_free, "function")?))
    }

    /// Create a userdata carrying `data`. The data stays pinned until the
    /// native side collects the userdata.
    pub fn create_userdata<T>(&self, data: T, metatable: Option<&Table>) -> Result<UserData>
    where
        T: Any + Send + Sync,
    {
        let token = callback::register_data(Arc::new(data), None);
        let scoped = ScopedToken::new(token);
        let state = self.state()?;
        let mt_guard = metatable.map(|mt| mt.0.acquire()).transpose()?;
        let mt_ptr = mt_guard.as_ref().map_or(std::ptr::null_mut(), |g| g.pointer());
        let dynamic = DynamicData {
            token,
            drop: callback::drop_trampoline,
        };
        let ptr = native::check(self.api(), unsafe {
            (self.api().userdata_new)(state.pointer(), dynamic, mt_ptr)
        })?;
        std::mem::forget(scoped);
        Ok(UserData(self.wrap(ptr, self.api().userdata_free, "userdata")?))
    }

    pub fn create_buffer(&self, bytes: impl AsRef<[u8]>) -> Result<Buffer> {
        let bytes = bytes.as_ref();
        let state = self.state()?;
        let ptr = native::check(self.api(), unsafe {
            (self.api().buffer_new)(state.pointer(), bytes.as_ptr(), bytes.len())
        })?;
        Ok(Buffer(self.wrap(ptr, self.api().buffer_free, "buffer")?))
    }

    pub fn create_thread(&self, f: &Function) -> Result<Thread> {
        let state = self.state()?;
        let func = f.0.acquire()?;
        let ptr = native::check(self.api(), unsafe { (self.api().thread_new)(state.pointer(), func.pointer()) })?;
        Ok(Thread(self.wrap(ptr, self.api().thread_free, "thread")?))
    }

    pub fn create_error(&self, message: impl AsRef<str>) -> Result<ScriptError> {
        let message = message.as_ref();
        let _state = self.state()?;
        let ptr = unsafe { (self.api().error_new)(message.as_ptr(), message.len()) };
        Ok(ScriptError(self.wrap(ptr, self.api().error_free, "error")?))
    }

    pub fn create_multivalue(&self, capacity: usize) -> Result<MultiValue> {
        let _state = self.state()?;
        MultiValue::with_capacity(self, capacity)
    }

    /// Compile `code` into a function.
    pub fn load(&self, code: impl AsRef<[u8]>, opts: &ChunkOptions) -> Result<Function> {
        let code = code.as_ref();
        let name = opts.name.as_deref().unwrap_or_default();
        let compiler = opts.compiler.unwrap_or_else(|| self.compiler_options());
        let state = self.state()?;
        let env_guard = opts.env.as_ref().map(|env| env.0.acquire()).transpose()?;
        let raw = vmlink_abi::ChunkOptions {
            name: name.as_ptr(),
            name_len: name.len(),
            env: env_guard.as_ref().map_or(std::ptr::null_mut(), |g| g.pointer()),
            mode: opts.mode.to_raw(),
            compiler: compiler.to_raw(),
            code: code.as_ptr(),
            code_len: code.len(),
        };
        let ptr = native::check(self.api(), unsafe { (self.api().load_chunk)(state.pointer(), raw) })?;
        Ok(Function(self.wrap(ptr, self.api().function_free, "function")?))
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vm({:?})", self.inner.state)
    }
}
