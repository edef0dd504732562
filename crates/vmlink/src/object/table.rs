use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::Mutex;
use vmlink_abi::{ForEachCallbackData, ForEachValueCallbackData, Tag, WireValue};

use super::ObjectRef;
use crate::callback;
use crate::error::{Error, Result};
use crate::native;
use crate::value::Value;
use crate::vm::Vm;

/// Native table.
///
/// Every operation holds a read lock on the table for its duration, so a
/// concurrent [`close`](Table::close) waits until it finishes.
#[derive(Clone, Debug)]
pub struct Table(pub(crate) ObjectRef);

impl Table {
    pub const TAG: Tag = Tag::Table;

    /// Run `f` with the live table pointer.
    fn with<T>(&self, f: impl FnOnce(&Vm, *mut c_void) -> Result<T>) -> Result<T> {
        let guard = self.0.acquire()?;
        f(self.0.vm(), guard.pointer())
    }

    pub fn clear(&self) -> Result<()> {
        self.with(|vm, t| native::check_none(vm.api(), unsafe { (vm.api().table_clear)(t) }))
    }

    pub fn contains_key(&self, key: impl Into<Value>) -> Result<bool> {
        let key = key.into();
        self.with(|vm, t| {
            let key = vm.value_to_wire(&key)?;
            native::check(vm.api(), unsafe { (vm.api().table_contains_key)(t, key) })
        })
    }

    /// Identity comparison; metamethods are not consulted.
    pub fn equals(&self, other: &Table) -> Result<bool> {
        self.with(|vm, t| {
            if self.0.same_handle(&other.0) {
                // Already held by this thread through `self`.
                let o = unsafe { other.0.handle().acquire_unchecked() }?;
                return native::check(vm.api(), unsafe { (vm.api().table_equals)(t, o) });
            }
            let o = other.0.acquire()?;
            native::check(vm.api(), unsafe { (vm.api().table_equals)(t, o.pointer()) })
        })
    }

    /// Get honouring `__index` on the metatable.
    pub fn get(&self, key: impl Into<Value>) -> Result<Value> {
        let key = key.into();
        self.with(|vm, t| {
            let key = vm.value_to_wire(&key)?;
            let wire = native::check(vm.api(), unsafe { (vm.api().table_get)(t, key) })?;
            Ok(vm.value_from_wire(wire))
        })
    }

    pub fn raw_get(&self, key: impl Into<Value>) -> Result<Value> {
        let key = key.into();
        self.with(|vm, t| {
            let key = vm.value_to_wire(&key)?;
            let wire = native::check(vm.api(), unsafe { (vm.api().table_raw_get)(t, key) })?;
            Ok(vm.value_from_wire(wire))
        })
    }

    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.with(|vm, t| {
            let (key, value) = wire_pair(vm, &key, &value)?;
            native::check_none(vm.api(), unsafe { (vm.api().table_set)(t, key, value) })
        })
    }

    pub fn raw_set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.with(|vm, t| {
            let (key, value) = wire_pair(vm, &key, &value)?;
            native::check_none(vm.api(), unsafe { (vm.api().table_raw_set)(t, key, value) })
        })
    }

    /// Length honouring `__len`.
    pub fn len(&self) -> Result<i64> {
        self.with(|vm, t| native::check(vm.api(), unsafe { (vm.api().table_len)(t) }))
    }

    pub fn raw_len(&self) -> Result<usize> {
        self.with(|vm, t| Ok(unsafe { (vm.api().table_raw_len)(t) }))
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.with(|vm, t| Ok(unsafe { (vm.api().table_is_empty)(t) }))
    }

    /// Append to the array part.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.with(|vm, t| {
            let value = vm.value_to_wire(&value)?;
            native::check_none(vm.api(), unsafe { (vm.api().table_push)(t, value) })
        })
    }

    pub fn raw_push(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.with(|vm, t| {
            let value = vm.value_to_wire(&value)?;
            native::check_none(vm.api(), unsafe { (vm.api().table_raw_push)(t, value) })
        })
    }

    /// Remove the last array element. `Nil` when the array part is empty.
    pub fn pop(&self) -> Result<Value> {
        self.with(|vm, t| {
            let wire = native::check(vm.api(), unsafe { (vm.api().table_pop)(t) })?;
            Ok(vm.value_from_wire(wire))
        })
    }

    pub fn raw_pop(&self) -> Result<Value> {
        self.with(|vm, t| {
            let wire = native::check(vm.api(), unsafe { (vm.api().table_raw_pop)(t) })?;
            Ok(vm.value_from_wire(wire))
        })
    }

    /// Insert at 1-based `idx`, shifting later elements up.
    pub fn raw_insert(&self, idx: i64, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.with(|vm, t| {
            let value = vm.value_to_wire(&value)?;
            native::check_none(vm.api(), unsafe { (vm.api().table_raw_insert)(t, idx, value) })
        })
    }

    /// Remove `key`. Integer keys inside the array part shift later
    /// elements down.
    pub fn raw_remove(&self, key: impl Into<Value>) -> Result<()> {
        let key = key.into();
        self.with(|vm, t| {
            let key = vm.value_to_wire(&key)?;
            native::check_none(vm.api(), unsafe { (vm.api().table_raw_remove)(t, key) })
        })
    }

    pub fn is_readonly(&self) -> Result<bool> {
        self.with(|vm, t| Ok(unsafe { (vm.api().table_is_readonly)(t) }))
    }

    /// No-op on a closed table.
    pub fn set_readonly(&self, enabled: bool) {
        let _ = self.with(|vm, t| {
            unsafe { (vm.api().table_set_readonly)(t, enabled) };
            Ok(())
        });
    }

    /// Mark the table as a safe environment. No-op on a closed table.
    pub fn set_safeenv(&self, enabled: bool) {
        let _ = self.with(|vm, t| {
            unsafe { (vm.api().table_set_safeenv)(t, enabled) };
            Ok(())
        });
    }

    pub fn metatable(&self) -> Result<Option<Table>> {
        self.with(|vm, t| {
            let mt = unsafe { (vm.api().table_metatable)(t) };
            if mt.is_null() {
                return Ok(None);
            }
            Ok(Some(Table(vm.wrap(mt, vm.api().table_free, "table")?)))
        })
    }

    /// Replace the metatable; `None` removes it.
    pub fn set_metatable(&self, mt: Option<&Table>) -> Result<()> {
        self.with(|vm, t| {
            let guard = mt.map(|mt| mt.0.acquire()).transpose()?;
            let mt_ptr = guard.as_ref().map_or(std::ptr::null_mut(), |g| g.pointer());
            native::check_none(vm.api(), unsafe { (vm.api().table_set_metatable)(t, mt_ptr) })
        })
    }

    /// Address of the native table, for hashing and debugging only.
    pub fn to_pointer(&self) -> Result<usize> {
        self.with(|vm, t| Ok(unsafe { (vm.api().table_to_pointer)(t) }))
    }

    /// Call `f` for every key/value pair.
    ///
    /// Iteration stops at the first error `f` returns, and that error is
    /// returned. A panic in `f` is caught and returned as
    /// [`Error::CallbackPanic`]. `f` may read and write the table; closing it
    /// from inside `f` fails with [`Error::ReentrantClose`].
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Value, Value) -> Result<()>,
    {
        self.with(|vm, t| {
            let failure = Arc::new(Mutex::new(None));
            let body = |arg: *mut c_void| {
                let data = unsafe { &mut *(arg as *mut ForEachCallbackData) };
                let key = vm.value_from_wire(std::mem::take(&mut data.key));
                let value = vm.value_from_wire(std::mem::take(&mut data.value));
                f(key, value)
            };
            let sink = stop_sink::<ForEachCallbackData>(failure.clone(), |data| &mut data.stop);
            let result = callback::with_scoped(body, sink, |desc| unsafe { (vm.api().table_for_each)(t, desc) });
            native::check_none(vm.api(), result)?;
            take_failure(&failure)
        })
    }

    /// Call `f` for every element of the array part, in order. Holes in the
    /// array part are skipped.
    pub fn for_each_value<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Value) -> Result<()>,
    {
        self.with(|vm, t| {
            let failure = Arc::new(Mutex::new(None));
            let body = |arg: *mut c_void| {
                let data = unsafe { &mut *(arg as *mut ForEachValueCallbackData) };
                f(vm.value_from_wire(std::mem::take(&mut data.value)))
            };
            let sink = stop_sink::<ForEachValueCallbackData>(failure.clone(), |data| &mut data.stop);
            let result =
                callback::with_scoped(body, sink, |desc| unsafe { (vm.api().table_for_each_value)(t, desc) });
            native::check_none(vm.api(), result)?;
            take_failure(&failure)
        })
    }

    pub fn close(&self) -> Result<()> {
        self.0.close()
    }
}

fn wire_pair(vm: &Vm, key: &Value, value: &Value) -> Result<(WireValue, WireValue)> {
    let key = vm.value_to_wire(key)?;
    match vm.value_to_wire(value) {
        Ok(value) => Ok((key, value)),
        Err(err) => {
            unsafe { (vm.api().value_free)(key) };
            Err(err)
        }
    }
}

/// Error sink for iteration callbacks: flags `stop` in the scratch data and
/// keeps the first error.
fn stop_sink<D>(
    failure: Arc<Mutex<Option<Error>>>,
    stop: fn(&mut D) -> &mut bool,
) -> impl Fn(*mut c_void, Error) + Send + Sync + 'static
where
    D: 'static,
{
    move |arg, err| {
        let data = unsafe { &mut *(arg as *mut D) };
        *stop(data) = true;
        failure.lock().get_or_insert(err);
    }
}

fn take_failure(failure: &Mutex<Option<Error>>) -> Result<()> {
    match failure.lock().take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
