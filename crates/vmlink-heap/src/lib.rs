//! Reference native heap for the vmlink ABI.
//!
//! Implements every entry point of [`vmlink_abi::NativeApi`] in-process:
//! reference-counted strings, tables, host-callback functions, userdata,
//! buffers, threads, error values and multivalues. There is no compiler or
//! interpreter; chunk loading always reports an error.
//!
//! Link it statically through [`api`], or build the cdylib and load it
//! through the exported `vmlink_get_api` symbol.

mod ffi;
pub mod object;
pub mod table;
pub mod value;

pub use ffi::{api, vmlink_get_api};
