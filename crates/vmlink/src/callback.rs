//! Process-wide callback/token registry.
//!
//! Native code never holds host values directly. Instead the host pins a
//! closure or a piece of data here and hands out an opaque integer token
//! together with two `extern "C"` trampolines ([`invoke_trampoline`],
//! [`drop_trampoline`]). The registry is independent of any VM instance.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use vmlink_abi::CallbackDescriptor;

use crate::error::{Error, Result};

/// Opaque registration id. Never zero.
pub type Token = usize;

/// Host data pinned by a token.
pub type PinnedData = Arc<dyn Any + Send + Sync>;

type InvokeBody = dyn Fn(*mut c_void) -> Result<()> + Send + Sync;
type FailureSink = dyn Fn(*mut c_void, Error) + Send + Sync;
type DropHook = Box<dyn FnOnce() + Send>;

/// A host closure callable from native code.
///
/// The body receives the raw scratch pointer the native side passed in. If
/// the body fails or panics, the failure is handed to the error sink, which
/// reports it back through the scratch data.
pub struct Callback {
    body: Box<InvokeBody>,
    on_error: Option<Box<FailureSink>>,
}

impl Callback {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(*mut c_void) -> Result<()> + Send + Sync + 'static,
    {
        Callback {
            body: Box::new(body),
            on_error: None,
        }
    }

    pub fn on_error<F>(mut self, sink: F) -> Self
    where
        F: Fn(*mut c_void, Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(sink));
        self
    }
}

enum Pinned {
    Callback(Callback),
    Data(PinnedData),
}

struct Registration {
    pinned: Pinned,
    on_drop: Mutex<Option<DropHook>>,
}

struct Registry {
    next: AtomicUsize,
    entries: RwLock<HashMap<Token, Arc<Registration>>>,
}

impl Registry {
    fn insert(&self, pinned: Pinned, on_drop: Option<DropHook>) -> Token {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration {
            pinned,
            on_drop: Mutex::new(on_drop),
        });
        self.entries.write().insert(token, registration);
        log::trace!("registered token {}", token);
        token
    }

    fn lookup(&self, token: Token) -> Option<Arc<Registration>> {
        self.entries.read().get(&token).cloned()
    }
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| Registry {
    next: AtomicUsize::new(1),
    entries: RwLock::new(HashMap::new()),
});

// ===== Registration =====

/// Pin a callback. `on_drop` runs once when the token is dropped.
pub fn register_callback(callback: Callback, on_drop: Option<DropHook>) -> Token {
    REGISTRY.insert(Pinned::Callback(callback), on_drop)
}

/// Pin host data, e.g. the value attached to a userdata.
pub fn register_data(data: PinnedData, on_drop: Option<DropHook>) -> Token {
    REGISTRY.insert(Pinned::Data(data), on_drop)
}

/// Bundle a token with the trampolines for transmission to native code.
pub fn descriptor(token: Token) -> CallbackDescriptor {
    CallbackDescriptor {
        invoke: invoke_trampoline,
        drop: drop_trampoline,
        token,
    }
}

/// Data pinned by `token`, if the token is live and pins data.
pub fn data(token: Token) -> Option<PinnedData> {
    match &REGISTRY.lookup(token)?.pinned {
        Pinned::Data(data) => Some(data.clone()),
        Pinned::Callback(_) => None,
    }
}

pub fn is_registered(token: Token) -> bool {
    REGISTRY.entries.read().contains_key(&token)
}

/// Number of live registrations in the process.
pub fn live_count() -> usize {
    REGISTRY.entries.read().len()
}

/// Unregister `token` and run its cleanup hook. Idempotent; safe from any
/// thread.
pub fn drop_token(token: Token) {
    let removed = REGISTRY.entries.write().remove(&token);
    let Some(registration) = removed else {
        return;
    };
    let hook = registration.on_drop.lock().take();
    if let Some(hook) = hook {
        hook();
    }
    log::trace!("dropped token {}", token);
}

/// Dispatch `arg` to the callback registered under `token`.
///
/// Unknown or dropped tokens are ignored. The whole dispatch runs under one
/// panic guard: a panic in the callback is routed to its error sink like any
/// other failure, and a panic in the sink, or in the callback's destructor
/// when this call held the last reference, is logged and swallowed.
///
/// # Safety
/// `arg` must be the scratch data the registered callback expects.
pub unsafe fn invoke(token: Token, arg: *mut c_void) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| dispatch(token, arg))) {
        report_panic("dispatch", token, payload);
    }
}

fn dispatch(token: Token, arg: *mut c_void) {
    let Some(registration) = REGISTRY.lookup(token) else {
        log::debug!("dispatch to unregistered token {}", token);
        return;
    };
    let Pinned::Callback(callback) = &registration.pinned else {
        log::debug!("dispatch to data token {}", token);
        return;
    };

    let outcome = match catch_unwind(AssertUnwindSafe(|| (callback.body)(arg))) {
        Ok(result) => result,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            log::warn!("callback {} panicked: {}", token, msg);
            Err(Error::CallbackPanic(msg))
        }
    };

    if let Err(err) = outcome {
        match &callback.on_error {
            Some(sink) => sink(arg, err),
            None => log::warn!("callback {} failed with no error sink: {}", token, err),
        }
    }
}

/// Log a panic caught at a trampoline. Never unwinds.
fn report_panic(stage: &str, token: Token, payload: Box<dyn Any + Send>) {
    let msg = panic_message(payload.as_ref());
    let _ = catch_unwind(AssertUnwindSafe(|| {
        log::warn!("{} for token {} panicked: {}", stage, token, msg);
    }));
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        String::from("unknown panic")
    }
}

// ===== Trampolines =====

/// # Safety
/// Called by native code with the scratch data matching `token`.
pub unsafe extern "C" fn invoke_trampoline(arg: *mut c_void, token: usize) {
    invoke(token, arg)
}

/// # Safety
/// Safe to call with any token, any number of times.
pub unsafe extern "C" fn drop_trampoline(token: usize) {
    if let Err(payload) = catch_unwind(|| drop_token(token)) {
        report_panic("drop hook", token, payload);
    }
}

/// Token dropped when the guard goes out of scope. Used for registrations
/// that must not outlive a single native call.
pub struct ScopedToken(Token);

impl ScopedToken {
    pub fn new(token: Token) -> Self {
        ScopedToken(token)
    }

    pub fn token(&self) -> Token {
        self.0
    }

    pub fn descriptor(&self) -> CallbackDescriptor {
        descriptor(self.0)
    }
}

impl Drop for ScopedToken {
    fn drop(&mut self) {
        drop_token(self.0);
    }
}

// ===== Scoped callbacks =====

type ScopedBody = dyn FnMut(*mut c_void) -> Result<()>;

/// A borrowed, thread-confined closure. Only the registering thread may run
/// it, and it is dropped on that thread before [`with_scoped`] returns.
struct Confined {
    owner: ThreadId,
    body: RefCell<Option<Box<ScopedBody>>>,
}

// SAFETY: `body` is only borrowed on `owner`; other threads are rejected
// before touching it. `with_scoped` keeps a reference until it has emptied
// `body`, so the closure is never dropped elsewhere.
unsafe impl Send for Confined {}
unsafe impl Sync for Confined {}

impl Confined {
    fn call(&self, arg: *mut c_void) -> Result<()> {
        if thread::current().id() != self.owner {
            return Err(Error::Native("scoped callback invoked from another thread".into()));
        }
        let mut slot = self
            .body
            .try_borrow_mut()
            .map_err(|_| Error::Native("scoped callback invoked reentrantly".into()))?;
        match slot.as_mut() {
            Some(body) => body(arg),
            None => Ok(()),
        }
    }
}

struct EmptyOnExit(Arc<Confined>);

impl Drop for EmptyOnExit {
    fn drop(&mut self) {
        let body = self.0.body.borrow_mut().take();
        drop(body);
    }
}

/// Run `scope` with a descriptor for `body`, registered only for the
/// duration of the call.
///
/// Unlike [`register_callback`], `body` may borrow from the caller and need
/// not be `Send`: it runs only on the calling thread and is dropped before
/// this returns. Invocations from other threads, or reentrant ones, fail and
/// are reported through `on_error`.
pub fn with_scoped<'a, F, S, R>(body: F, on_error: S, scope: impl FnOnce(CallbackDescriptor) -> R) -> R
where
    F: FnMut(*mut c_void) -> Result<()> + 'a,
    S: Fn(*mut c_void, Error) + Send + Sync + 'static,
{
    let body: Box<dyn FnMut(*mut c_void) -> Result<()> + 'a> = Box::new(body);
    // SAFETY: `EmptyOnExit` drops the closure before `'a` ends, and
    // `Confined::call` never runs it after that.
    let body = unsafe {
        std::mem::transmute::<Box<dyn FnMut(*mut c_void) -> Result<()> + 'a>, Box<ScopedBody>>(body)
    };
    let confined = Arc::new(Confined {
        owner: thread::current().id(),
        body: RefCell::new(Some(body)),
    });
    let _empty = EmptyOnExit(confined.clone());

    let callback = Callback::new(move |arg| confined.call(arg)).on_error(on_error);
    let token = ScopedToken::new(register_callback(callback, None));
    scope(token.descriptor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_delivers_exact_pointer() {
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();
        let token = register_callback(
            Callback::new(move |arg| {
                sink.store(arg as usize, Ordering::SeqCst);
                Ok(())
            }),
            None,
        );
        let mut scratch = 0u64;
        let arg = &mut scratch as *mut u64 as *mut c_void;
        let desc = descriptor(token);
        unsafe { (desc.invoke)(arg, desc.token) };
        assert_eq!(seen.load(Ordering::SeqCst), arg as usize);
        drop_token(token);
    }

    #[test]
    fn test_drop_stops_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(AtomicUsize::new(0));
        let (c, h) = (calls.clone(), hooks.clone());
        let token = register_callback(
            Callback::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Some(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })),
        );
        unsafe { invoke(token, std::ptr::null_mut()) };
        assert!(is_registered(token));

        unsafe { drop_trampoline(token) };
        unsafe { drop_trampoline(token) };
        unsafe { invoke(token, std::ptr::null_mut()) };

        assert!(!is_registered(token));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_reach_sink() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let token = register_callback(
            Callback::new(|arg| {
                if arg.is_null() {
                    panic!("null scratch");
                }
                Err(Error::external("rejected"))
            })
            .on_error(move |_, err| sink.lock().push(err)),
            None,
        );
        let mut scratch = 0u8;
        unsafe {
            invoke(token, std::ptr::null_mut());
            invoke(token, &mut scratch as *mut u8 as *mut c_void);
        }
        drop_token(token);

        let errors = errors.lock();
        assert_eq!(errors[0], Error::CallbackPanic("null scratch".into()));
        assert_eq!(errors[1], Error::External("rejected".into()));
    }

    #[test]
    fn test_pinned_data() {
        let token = register_data(Arc::new(42u32), None);
        let data = data(token).unwrap();
        assert_eq!(data.downcast_ref::<u32>(), Some(&42));
        // A data token never dispatches.
        unsafe { invoke(token, std::ptr::null_mut()) };
        drop_token(token);
        assert!(super::data(token).is_none());
    }

    #[test]
    fn test_scoped_token() {
        let token = {
            let scoped = ScopedToken::new(register_callback(Callback::new(|_| Ok(())), None));
            assert_eq!(scoped.descriptor().token, scoped.token());
            scoped.token()
        };
        assert!(!is_registered(token));
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let token = register_callback(
            Callback::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::external("fail"))
            })
            .on_error(|_, _| panic!("sink panicked")),
            None,
        );
        let desc = descriptor(token);
        unsafe {
            (desc.invoke)(std::ptr::null_mut(), desc.token);
            (desc.invoke)(std::ptr::null_mut(), desc.token);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        drop_token(token);
    }

    struct PanicOnDrop;

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            panic!("destructor panicked");
        }
    }

    #[test]
    fn test_panicking_destructor_after_self_drop_is_contained() {
        let own = Arc::new(AtomicUsize::new(0));
        let slot = own.clone();
        let guard = PanicOnDrop;
        let token = register_callback(
            Callback::new(move |_| {
                let _ = &guard;
                // The dispatch still holds the registration; the closure is
                // destroyed when the dispatch ends.
                drop_token(slot.load(Ordering::SeqCst));
                Ok(())
            }),
            None,
        );
        own.store(token, Ordering::SeqCst);
        unsafe { invoke_trampoline(std::ptr::null_mut(), token) };
        assert!(!is_registered(token));
    }

    #[test]
    fn test_scoped_borrows_caller_state() {
        let mut seen = Vec::new();
        let token = with_scoped(
            |arg| {
                seen.push(arg as usize);
                Ok(())
            },
            |_, _| {},
            |desc| {
                unsafe {
                    (desc.invoke)(4 as *mut c_void, desc.token);
                    (desc.invoke)(8 as *mut c_void, desc.token);
                }
                desc.token
            },
        );
        assert!(!is_registered(token));
        assert_eq!(seen, vec![4, 8]);
    }

    #[test]
    fn test_scoped_rejects_other_threads() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let mut calls = 0;
        with_scoped(
            |_| {
                calls += 1;
                Ok(())
            },
            move |_, err| sink.lock().push(err),
            |desc| {
                let token = desc.token;
                thread::spawn(move || unsafe { invoke(token, std::ptr::null_mut()) })
                    .join()
                    .unwrap();
            },
        );
        assert_eq!(calls, 0);
        assert_eq!(
            *errors.lock(),
            vec![Error::Native("scoped callback invoked from another thread".into())]
        );
    }
}
