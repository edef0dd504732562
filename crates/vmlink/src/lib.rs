//! Host-side boundary for driving an embedded native VM.
//!
//! The native library owns every VM object; the host refers to them through
//! [`Handle`]s, passes values through [`Value`] marshaling, and lets native
//! code call back into host closures through registry tokens
//! ([`callback`]).
//!
//! ```ignore
//! let vm = Vm::new(Backend::from_env()?)?;
//! let t = vm.create_table()?;
//! t.push(1)?;
//! t.set("name", "demo")?;
//! t.for_each(|k, v| {
//!     println!("{} = {}", k, v);
//!     Ok(())
//! })?;
//! ```

pub mod backend;
pub mod callback;
pub mod error;
pub mod handle;
pub mod multivalue;
mod native;
pub mod object;
pub mod options;
pub mod value;
pub mod vm;

pub use backend::Backend;
pub use error::{Error, Result};
pub use handle::{Handle, HandleGuard};
pub use multivalue::MultiValue;
pub use object::{Buffer, Function, ScriptError, Table, Thread, UserData, VmString};
pub use options::{ChunkMode, ChunkOptions, CompilerOptions, CoverageLevel, DebugLevel, OptimizationLevel, TypeInfoLevel};
pub use value::{LightUserData, Value};
pub use vm::Vm;

pub use vmlink_abi as abi;
