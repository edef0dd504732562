//! Heap values and their wire representation.
//!
//! Every object pointer handed across the boundary is a `Box<Arc<T>>`: one
//! box per reference, so cloning a wire value allocates a new box and
//! freeing it drops one reference.

use std::ffi::c_void;
use std::sync::Arc;

use vmlink_abi::{Tag, WireValue};

use crate::object::{BufferObj, ErrorObj, FunctionObj, ThreadObj, UserDataObj};
use crate::table::TableObj;

#[derive(Clone, Default)]
pub enum HeapValue {
    #[default]
    Nil,
    Boolean(bool),
    LightUserData(usize),
    Integer(i64),
    Number(f64),
    Vector([f32; 3]),
    String(Arc<[u8]>),
    Table(Arc<TableObj>),
    Function(Arc<FunctionObj>),
    Thread(Arc<ThreadObj>),
    UserData(Arc<UserDataObj>),
    Buffer(Arc<BufferObj>),
    Error(Arc<ErrorObj>),
    Other,
}

// ===== Boxed references =====

pub(crate) fn into_raw<T: ?Sized>(obj: Arc<T>) -> *mut c_void {
    Box::into_raw(Box::new(obj)) as *mut c_void
}

/// # Safety
/// `ptr` must come from [`into_raw`] with the same `T` and still be live.
pub(crate) unsafe fn borrow<'a, T: ?Sized>(ptr: *mut c_void) -> &'a Arc<T> {
    &*(ptr as *const Arc<T>)
}

/// # Safety
/// `ptr` must come from [`into_raw`] with the same `T`; it is consumed.
pub(crate) unsafe fn take<T: ?Sized>(ptr: *mut c_void) -> Arc<T> {
    *Box::from_raw(ptr as *mut Arc<T>)
}

impl HeapValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, HeapValue::Nil)
    }

    /// Take ownership of a wire value.
    ///
    /// # Safety
    /// Object payloads must be live pointers produced by this heap.
    pub unsafe fn from_wire(wire: WireValue) -> Self {
        Self::decode(wire, true)
    }

    /// Read a wire value without consuming it.
    ///
    /// # Safety
    /// Same as [`HeapValue::from_wire`].
    pub unsafe fn peek(wire: WireValue) -> Self {
        Self::decode(wire, false)
    }

    unsafe fn decode(wire: WireValue, consume: bool) -> Self {
        let kind = wire.kind();
        if kind.is_object() {
            let ptr = wire.as_pointer().unwrap_or(std::ptr::null_mut());
            if ptr.is_null() {
                return HeapValue::Nil;
            }
            macro_rules! object {
                ($variant:ident, $ty:ty) => {
                    if consume {
                        HeapValue::$variant(take::<$ty>(ptr))
                    } else {
                        HeapValue::$variant(borrow::<$ty>(ptr).clone())
                    }
                };
            }
            return match kind {
                Tag::String => object!(String, [u8]),
                Tag::Table => object!(Table, TableObj),
                Tag::Function => object!(Function, FunctionObj),
                Tag::Thread => object!(Thread, ThreadObj),
                Tag::UserData => object!(UserData, UserDataObj),
                Tag::Buffer => object!(Buffer, BufferObj),
                Tag::Error => object!(Error, ErrorObj),
                _ => HeapValue::Other,
            };
        }
        match kind {
            Tag::Nil => HeapValue::Nil,
            Tag::Boolean => HeapValue::Boolean(wire.as_boolean().unwrap_or_default()),
            Tag::LightUserData => {
                HeapValue::LightUserData(wire.as_pointer().unwrap_or(std::ptr::null_mut()) as usize)
            }
            Tag::Integer => HeapValue::Integer(wire.as_integer().unwrap_or_default()),
            Tag::Number => HeapValue::Number(wire.as_number().unwrap_or_default()),
            Tag::Vector => HeapValue::Vector(wire.as_vector().unwrap_or_default()),
            _ => HeapValue::Other,
        }
    }

    /// Produce an owned wire value referencing this value.
    pub fn to_wire(&self) -> WireValue {
        match self {
            HeapValue::Nil => WireValue::nil(),
            HeapValue::Boolean(b) => WireValue::boolean(*b),
            HeapValue::LightUserData(p) => WireValue::light_userdata(*p as *mut c_void),
            HeapValue::Integer(i) => WireValue::integer(*i),
            HeapValue::Number(n) => WireValue::number(*n),
            HeapValue::Vector(v) => WireValue::vector(*v),
            HeapValue::String(s) => WireValue::object(Tag::String, into_raw(s.clone())),
            HeapValue::Table(t) => WireValue::object(Tag::Table, into_raw(t.clone())),
            HeapValue::Function(f) => WireValue::object(Tag::Function, into_raw(f.clone())),
            HeapValue::Thread(t) => WireValue::object(Tag::Thread, into_raw(t.clone())),
            HeapValue::UserData(u) => WireValue::object(Tag::UserData, into_raw(u.clone())),
            HeapValue::Buffer(b) => WireValue::object(Tag::Buffer, into_raw(b.clone())),
            HeapValue::Error(e) => WireValue::object(Tag::Error, into_raw(e.clone())),
            HeapValue::Other => WireValue::other(),
        }
    }

    /// Identity address for reference types.
    pub(crate) fn identity(&self) -> Option<usize> {
        Some(match self {
            HeapValue::String(s) => Arc::as_ptr(s) as *const u8 as usize,
            HeapValue::Table(t) => Arc::as_ptr(t) as usize,
            HeapValue::Function(f) => Arc::as_ptr(f) as usize,
            HeapValue::Thread(t) => Arc::as_ptr(t) as usize,
            HeapValue::UserData(u) => Arc::as_ptr(u) as usize,
            HeapValue::Buffer(b) => Arc::as_ptr(b) as usize,
            HeapValue::Error(e) => Arc::as_ptr(e) as usize,
            _ => return None,
        })
    }
}

impl std::fmt::Debug for HeapValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeapValue::Nil => write!(f, "nil"),
            HeapValue::Boolean(b) => write!(f, "{}", b),
            HeapValue::LightUserData(p) => write!(f, "lightuserdata({:#x})", p),
            HeapValue::Integer(i) => write!(f, "{}", i),
            HeapValue::Number(n) => write!(f, "{}", n),
            HeapValue::Vector(v) => write!(f, "vector({:?})", v),
            HeapValue::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            HeapValue::Other => write!(f, "other"),
            other => write!(f, "object({:#x})", other.identity().unwrap_or_default()),
        }
    }
}
