//! Host values and their conversion to and from [`WireValue`].
//!
//! Inbound values (native to host) are owned by the receiver, so object
//! pointers are wrapped in a fresh [`Handle`](crate::Handle) and never
//! cloned. Outbound values (host to native) are consumed by the callee, so
//! handle-backed values are cloned under a read lock and the clone is sent.

use std::ffi::c_void;
use std::fmt;

use vmlink_abi::{Tag, WireValue};

use crate::error::Result;
use crate::object::{Buffer, Function, ScriptError, Table, Thread, UserData, VmString};
use crate::vm::Vm;

/// Raw, unmanaged pointer stored as a light userdata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightUserData(pub *mut c_void);

// SAFETY: the pointer is an opaque value to both sides; nothing here
// dereferences it.
unsafe impl Send for LightUserData {}
unsafe impl Sync for LightUserData {}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    LightUserData(LightUserData),
    Integer(i64),
    Number(f64),
    Vector([f32; 3]),
    String(VmString),
    Table(Table),
    Function(Function),
    Thread(Thread),
    UserData(UserData),
    Buffer(Buffer),
    Error(ScriptError),
    /// A value of a type this host does not understand.
    Other,
    /// Host string converted to a fresh native string when sent. Never
    /// produced by inbound conversion.
    HostString(String),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Nil => Tag::Nil,
            Value::Boolean(_) => Tag::Boolean,
            Value::LightUserData(_) => Tag::LightUserData,
            Value::Integer(_) => Tag::Integer,
            Value::Number(_) => Tag::Number,
            Value::Vector(_) => Tag::Vector,
            Value::String(_) | Value::HostString(_) => Tag::String,
            Value::Table(_) => Tag::Table,
            Value::Function(_) => Tag::Function,
            Value::Thread(_) => Tag::Thread,
            Value::UserData(_) => Tag::UserData,
            Value::Buffer(_) => Tag::Buffer,
            Value::Error(_) => Tag::Error,
            Value::Other => Tag::Other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.tag().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Close the handle behind this value, if any.
    pub fn close(&self) -> Result<()> {
        match self {
            Value::String(s) => s.close(),
            Value::Table(t) => t.close(),
            Value::Function(f) => f.close(),
            Value::Thread(t) => t.close(),
            Value::UserData(u) => u.close(),
            Value::Buffer(b) => b.close(),
            Value::Error(e) => e.close(),
            _ => Ok(()),
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<[f32; 3]> {
        match self {
            Value::Vector(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&VmString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&UserData> {
        match self {
            Value::UserData(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Buffer> {
        match self {
            Value::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ScriptError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Vector([x, y, z]) => write!(f, "{}, {}, {}", x, y, z),
            Value::HostString(s) => write!(f, "{}", s),
            Value::String(s) => match s.to_string_lossy() {
                Ok(text) => write!(f, "{}", text),
                Err(_) => write!(f, "string: closed"),
            },
            other => write!(f, "{}", other.type_name()),
        }
    }
}

// ===== Conversions into Value =====

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<[f32; 3]> for Value {
    fn from(v: [f32; 3]) -> Self {
        Value::Vector(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::HostString(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::HostString(s)
    }
}

impl From<LightUserData> for Value {
    fn from(p: LightUserData) -> Self {
        Value::LightUserData(p)
    }
}

macro_rules! impl_from_object {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_object! {
    VmString => String,
    Table => Table,
    Function => Function,
    Thread => Thread,
    UserData => UserData,
    Buffer => Buffer,
    ScriptError => Error,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

// ===== Marshaling =====

impl Vm {
    /// Convert a host value into an owned wire value for a consuming call.
    pub fn value_to_wire(&self, value: &Value) -> Result<WireValue> {
        Ok(match value {
            Value::Nil => WireValue::nil(),
            Value::Boolean(b) => WireValue::boolean(*b),
            Value::LightUserData(p) => WireValue::light_userdata(p.0),
            Value::Integer(i) => WireValue::integer(*i),
            Value::Number(n) => WireValue::number(*n),
            Value::Vector(v) => WireValue::vector(*v),
            Value::Other => WireValue::other(),
            Value::HostString(s) => WireValue::object(Tag::String, self.new_string_raw(s.as_bytes())?),
            Value::String(s) => s.0.to_wire(Tag::String)?,
            Value::Table(t) => t.0.to_wire(Tag::Table)?,
            Value::Function(f) => f.0.to_wire(Tag::Function)?,
            Value::Thread(t) => t.0.to_wire(Tag::Thread)?,
            Value::UserData(u) => u.0.to_wire(Tag::UserData)?,
            Value::Buffer(b) => b.0.to_wire(Tag::Buffer)?,
            Value::Error(e) => e.0.to_wire(Tag::Error)?,
        })
    }

    /// Take ownership of a wire value produced by the native side.
    pub fn value_from_wire(&self, wire: WireValue) -> Value {
        let api = self.api();
        let kind = wire.kind();
        let object = |free, name| {
            let ptr = wire.as_pointer().unwrap_or(std::ptr::null_mut());
            match self.wrap(ptr, free, name) {
                Ok(obj) => Some(obj),
                Err(err) => {
                    log::debug!("dropping inbound {}: {}", name, err);
                    None
                }
            }
        };
        let value = match kind {
            Tag::Nil => Some(Value::Nil),
            Tag::Boolean => wire.as_boolean().map(Value::Boolean),
            Tag::LightUserData => wire.as_pointer().map(|p| Value::LightUserData(LightUserData(p))),
            Tag::Integer => wire.as_integer().map(Value::Integer),
            Tag::Number => wire.as_number().map(Value::Number),
            Tag::Vector => wire.as_vector().map(Value::Vector),
            Tag::String => object(api.string_free, "string").map(|o| Value::String(VmString(o))),
            Tag::Table => object(api.table_free, "table").map(|o| Value::Table(Table(o))),
            Tag::Function => object(api.function_free, "function").map(|o| Value::Function(Function(o))),
            Tag::Thread => object(api.thread_free, "thread").map(|o| Value::Thread(Thread(o))),
            Tag::UserData => object(api.userdata_free, "userdata").map(|o| Value::UserData(UserData(o))),
            Tag::Buffer => object(api.buffer_free, "buffer").map(|o| Value::Buffer(Buffer(o))),
            Tag::Error => object(api.error_free, "error").map(|o| Value::Error(ScriptError(o))),
            Tag::Other => Some(Value::Other),
        };
        value.unwrap_or(Value::Nil)
    }
}
