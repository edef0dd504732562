//! Boundary contracts between a host and an embedded native VM.
//!
//! Everything in this crate is `#[repr(C)]` and shared verbatim by both
//! sides. The host crate (`vmlink`) consumes a [`NativeApi`] table; a native
//! library produces one, either statically or through the exported
//! [`GET_API_SYMBOL`] entry point.
//!
//! Ownership conventions, which every entry point follows:
//! - A pointer returned from a constructor or from `value_clone` is owned by
//!   the caller and released through the matching `*_free` entry point.
//! - A [`WireValue`] passed *into* `multivalue_push`, `table_set`,
//!   `table_push` and friends is consumed by the callee.
//! - A [`WireValue`] produced by `multivalue_pop`, `table_get` or delivered
//!   in callback data is owned by the receiver.
//! - Receivers passed as the first argument are borrowed for the duration of
//!   the call only.
//! - Error messages in results are owned by the receiver and released with
//!   `error_message_free`.

#![cfg_attr(not(test), no_std)]

mod api;
mod callback;
mod options;
mod result;
mod value;

pub use api::{FreeFn, GetApiFn, NativeApi, GET_API_SYMBOL};
pub use callback::{
    CallbackDescriptor, DropFn, DynamicData, ForEachCallbackData, ForEachValueCallbackData,
    FunctionCallbackData, InvokeFn,
};
pub use options::{ChunkOptions, CompilerOptions};
pub use result::{
    BoolResult, Bytes, I64Result, NativeResult, NoneResult, PtrResult, UsizeResult, ValueResult,
};
pub use value::{Payload, Tag, WireValue};

/// ABI version. Bumped on any layout change of the types in this crate.
pub const ABI_VERSION: u32 = 1;

/// Opaque native object pointer.
pub type RawPtr = *mut core::ffi::c_void;
