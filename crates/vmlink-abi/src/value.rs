//! Tagged wire value.

use core::ffi::c_void;
use core::fmt;

use num_enum::TryFromPrimitive;

/// Wire tag of a [`WireValue`].
///
/// Tags 7..=12 plus 6 carry an owned object pointer in the payload.
/// Any other byte is reported as [`Tag::Other`] and its payload is never read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Tag {
    Nil = 0,
    Boolean = 1,
    LightUserData = 2,
    Integer = 3,
    Number = 4,
    Vector = 5,
    String = 6,
    Table = 7,
    Function = 8,
    Thread = 9,
    UserData = 10,
    Buffer = 11,
    Error = 12,
    Other = 13,
}

impl Tag {
    /// Decode a raw tag byte. Unknown bytes map to `Other`.
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        Self::try_from(v).unwrap_or(Tag::Other)
    }

    /// Does a value with this tag own a native object pointer?
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::Table
                | Self::Function
                | Self::Thread
                | Self::UserData
                | Self::Buffer
                | Self::Error
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::LightUserData => "lightuserdata",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Vector => "vector",
            Self::String => "string",
            Self::Table => "table",
            Self::Function => "function",
            Self::Thread => "thread",
            Self::UserData => "userdata",
            Self::Buffer => "buffer",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

/// Payload of a [`WireValue`]. Which field is live is decided by the tag.
#[repr(C)]
#[derive(Clone, Copy)]
pub union Payload {
    pub boolean: bool,
    pub integer: i64,
    pub number: f64,
    pub vector: [f32; 3],
    pub pointer: *mut c_void,
}

/// Fixed-layout value exchanged across the boundary.
///
/// The tag is kept as a raw byte so that values produced by a newer native
/// library survive the trip as `Tag::Other` instead of being misread.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct WireValue {
    pub tag: u8,
    pub payload: Payload,
}

impl WireValue {
    #[inline]
    fn zeroed(tag: Tag) -> Self {
        WireValue {
            tag: tag as u8,
            payload: Payload { vector: [0.0; 3] },
        }
    }

    pub fn nil() -> Self {
        Self::zeroed(Tag::Nil)
    }

    pub fn other() -> Self {
        Self::zeroed(Tag::Other)
    }

    pub fn boolean(b: bool) -> Self {
        let mut v = Self::zeroed(Tag::Boolean);
        v.payload.boolean = b;
        v
    }

    pub fn integer(i: i64) -> Self {
        WireValue { tag: Tag::Integer as u8, payload: Payload { integer: i } }
    }

    pub fn number(n: f64) -> Self {
        WireValue { tag: Tag::Number as u8, payload: Payload { number: n } }
    }

    pub fn vector(v: [f32; 3]) -> Self {
        WireValue { tag: Tag::Vector as u8, payload: Payload { vector: v } }
    }

    pub fn light_userdata(p: *mut c_void) -> Self {
        WireValue { tag: Tag::LightUserData as u8, payload: Payload { pointer: p } }
    }

    /// Build an object-carrying value. `tag` must satisfy [`Tag::is_object`].
    pub fn object(tag: Tag, p: *mut c_void) -> Self {
        debug_assert!(tag.is_object());
        WireValue { tag: tag as u8, payload: Payload { pointer: p } }
    }

    #[inline]
    pub fn kind(&self) -> Tag {
        Tag::from_u8(self.tag)
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self.kind() {
            Tag::Boolean => Some(unsafe { self.payload.boolean }),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.kind() {
            Tag::Integer => Some(unsafe { self.payload.integer }),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.kind() {
            Tag::Number => Some(unsafe { self.payload.number }),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<[f32; 3]> {
        match self.kind() {
            Tag::Vector => Some(unsafe { self.payload.vector }),
            _ => None,
        }
    }

    /// Pointer payload of a light userdata or object value.
    pub fn as_pointer(&self) -> Option<*mut c_void> {
        let kind = self.kind();
        if kind == Tag::LightUserData || kind.is_object() {
            Some(unsafe { self.payload.pointer })
        } else {
            None
        }
    }
}

impl Default for WireValue {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match kind {
            Tag::Nil | Tag::Other => write!(f, "{}", kind.name()),
            Tag::Boolean => write!(f, "boolean({:?})", self.as_boolean().unwrap_or_default()),
            Tag::Integer => write!(f, "integer({:?})", self.as_integer().unwrap_or_default()),
            Tag::Number => write!(f, "number({:?})", self.as_number().unwrap_or_default()),
            Tag::Vector => write!(f, "vector({:?})", self.as_vector().unwrap_or_default()),
            _ => write!(f, "{}({:p})", kind.name(), self.as_pointer().unwrap_or(core::ptr::null_mut())),
        }
    }
}
