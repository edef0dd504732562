//! Handle: exclusive-ownership proxy around one native pointer.
//!
//! A handle holds its pointer behind a `parking_lot::RwLock`. Readers take
//! the shared lock for the duration of a native call; `close()` takes the
//! exclusive lock, runs the destructor once and nils the pointer. The lock is
//! task-fair, so a pending `close()` stops new readers from being admitted.
//!
//! Reentrancy is tracked per thread. A thread that already holds a guard on
//! a handle acquires it again with `read_recursive`, which never queues
//! behind a pending writer. The same thread may not close a handle it still
//! holds; that returns [`Error::ReentrantClose`] instead of deadlocking.

use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;

use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use vmlink_abi::FreeFn;

use crate::error::{Error, Result};

#[derive(Clone, Copy)]
struct RawPtr(*mut c_void);

// SAFETY: the pointer is only dereferenced by native code, which is
// responsible for its own synchronization; the lock around it orders
// destruction against use.
unsafe impl Send for RawPtr {}
unsafe impl Sync for RawPtr {}

thread_local! {
    /// Guards held by this thread, keyed by handle address.
    static HELD: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
}

fn held_count(key: usize) -> usize {
    HELD.with(|held| held.borrow().get(&key).copied().unwrap_or(0))
}

fn mark_held(key: usize) {
    HELD.with(|held| *held.borrow_mut().entry(key).or_insert(0) += 1);
}

fn unmark_held(key: usize) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(count) = held.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                held.remove(&key);
            }
        }
    });
}

pub struct Handle {
    ptr: RwLock<RawPtr>,
    destructor: FreeFn,
    kind: &'static str,
}

impl Handle {
    /// Take ownership of `ptr`. Returns `None` for a null pointer.
    ///
    /// # Safety
    /// `ptr` must be an owned native pointer that `destructor` releases, and
    /// nothing else may release it.
    pub unsafe fn from_raw(ptr: *mut c_void, destructor: FreeFn, kind: &'static str) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(Handle {
            ptr: RwLock::new(RawPtr(ptr)),
            destructor,
            kind,
        })
    }

    /// Type name used in error messages.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    #[inline]
    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Does the current thread hold a guard on this handle?
    pub fn is_held_by_current_thread(&self) -> bool {
        held_count(self.key()) > 0
    }

    /// Acquire the pointer under a shared lock.
    pub fn acquire(&self) -> Result<HandleGuard<'_>> {
        let key = self.key();
        let guard = if held_count(key) > 0 {
            self.ptr.read_recursive()
        } else {
            self.ptr.read()
        };
        if guard.0.is_null() {
            return Err(Error::ClosedHandle { kind: self.kind });
        }
        mark_held(key);
        Ok(HandleGuard { guard, key })
    }

    /// Read the pointer without locking.
    ///
    /// # Safety
    /// The current thread must hold a [`HandleGuard`] on this handle for as
    /// long as the returned pointer is used.
    pub unsafe fn acquire_unchecked(&self) -> Result<*mut c_void> {
        debug_assert!(self.is_held_by_current_thread());
        let ptr = (*self.ptr.data_ptr()).0;
        if ptr.is_null() {
            return Err(Error::ClosedHandle { kind: self.kind });
        }
        Ok(ptr)
    }

    pub fn is_closed(&self) -> bool {
        let guard = if self.is_held_by_current_thread() {
            self.ptr.read_recursive()
        } else {
            self.ptr.read()
        };
        guard.0.is_null()
    }

    /// Destroy the native object. Waits for in-flight readers on other
    /// threads; a no-op when already closed.
    pub fn close(&self) -> Result<()> {
        if self.is_held_by_current_thread() {
            return Err(Error::ReentrantClose { kind: self.kind });
        }
        let mut ptr = self.ptr.write();
        if ptr.0.is_null() {
            return Ok(());
        }
        log::trace!("closing {} handle {:p}", self.kind, ptr.0);
        unsafe { (self.destructor)(ptr.0) };
        ptr.0 = std::ptr::null_mut();
        Ok(())
    }

    /// Give up ownership of the pointer without destroying it. The handle
    /// behaves as closed afterwards.
    pub fn release(&self) -> Result<*mut c_void> {
        if self.is_held_by_current_thread() {
            return Err(Error::ReentrantClose { kind: self.kind });
        }
        let mut ptr = self.ptr.write();
        if ptr.0.is_null() {
            return Err(Error::ClosedHandle { kind: self.kind });
        }
        Ok(std::mem::replace(&mut ptr.0, std::ptr::null_mut()))
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let ptr = self.ptr.get_mut();
        if !ptr.0.is_null() {
            log::trace!("finalizing unclosed {} handle {:p}", self.kind, ptr.0);
            unsafe { (self.destructor)(ptr.0) };
            ptr.0 = std::ptr::null_mut();
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.acquire() {
            Ok(guard) => write!(f, "Handle({}, {:p})", self.kind, guard.pointer()),
            Err(_) => write!(f, "Handle({}, closed)", self.kind),
        }
    }
}

/// Shared access to a live handle pointer. Not `Send`: the reentrancy count
/// belongs to the acquiring thread.
pub struct HandleGuard<'a> {
    guard: RwLockReadGuard<'a, RawPtr>,
    key: usize,
}

impl HandleGuard<'_> {
    #[inline]
    pub fn pointer(&self) -> *mut c_void {
        self.guard.0
    }
}

impl fmt::Debug for HandleGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleGuard({:p})", self.pointer())
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        unmark_held(self.key);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    unsafe extern "C" fn count_free(ptr: *mut c_void) {
        let counter = Box::from_raw(ptr as *mut Arc<AtomicUsize>);
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// A handle whose destructor bumps the returned counter.
    pub(crate) fn counting_handle() -> (Handle, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let raw = Box::into_raw(Box::new(counter.clone())) as *mut c_void;
        let handle = unsafe { Handle::from_raw(raw, count_free, "test") }.unwrap();
        (handle, counter)
    }

    #[test]
    fn test_null_is_rejected() {
        assert!(unsafe { Handle::from_raw(std::ptr::null_mut(), count_free, "test") }.is_none());
    }

    #[test]
    fn test_close_then_acquire() {
        let (handle, counter) = counting_handle();
        assert!(handle.acquire().is_ok());
        handle.close().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            handle.acquire().err(),
            Some(Error::ClosedHandle { kind: "test" })
        );
        assert!(handle.is_closed());

        // Idempotent, and the backstop does not run again.
        handle.close().unwrap();
        drop(handle);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_backstop() {
        let (handle, counter) = counting_handle();
        drop(handle);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_acquire_and_close() {
        let (handle, counter) = counting_handle();
        let outer = handle.acquire().unwrap();
        let inner = handle.acquire().unwrap();
        assert_eq!(outer.pointer(), inner.pointer());
        assert_eq!(unsafe { handle.acquire_unchecked() }.unwrap(), outer.pointer());
        assert_eq!(handle.close(), Err(Error::ReentrantClose { kind: "test" }));
        drop(inner);
        assert_eq!(handle.close(), Err(Error::ReentrantClose { kind: "test" }));
        drop(outer);
        assert!(!handle.is_held_by_current_thread());
        handle.close().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_disowns() {
        let (handle, counter) = counting_handle();
        let raw = handle.release().unwrap();
        assert!(handle.is_closed());
        drop(handle);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        unsafe { count_free(raw) };
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_acquire_then_close() {
        const READERS: usize = 8;
        let (handle, counter) = counting_handle();
        let handle = Arc::new(handle);
        let expected = handle.acquire().unwrap().pointer() as usize;
        let barrier = Arc::new(Barrier::new(READERS + 1));
        let finished = Arc::new(AtomicUsize::new(0));

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let handle = handle.clone();
                let barrier = barrier.clone();
                let finished = finished.clone();
                thread::spawn(move || {
                    let guard = handle.acquire().unwrap();
                    let seen = guard.pointer() as usize;
                    barrier.wait();
                    thread::sleep(Duration::from_millis(20));
                    finished.fetch_add(1, Ordering::SeqCst);
                    drop(guard);
                    seen
                })
            })
            .collect();

        barrier.wait();
        handle.close().unwrap();
        // close() could only take the write lock after every reader let go.
        assert_eq!(finished.load(Ordering::SeqCst), READERS);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        for reader in readers {
            assert_eq!(reader.join().unwrap(), expected);
        }
        assert!(handle.acquire().unwrap_err().is_closed_handle());
    }
}
