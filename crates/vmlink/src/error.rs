//! Error types for the boundary layer.

use thiserror::Error;

/// Errors raised while driving the native VM.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The handle was closed before or during the operation.
    #[error("{kind} handle is closed")]
    ClosedHandle { kind: &'static str },

    /// A value could not be converted across the boundary.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The native side reported an error.
    #[error("{0}")]
    Native(String),

    /// A host callback panicked; the panic was caught at the trampoline.
    #[error("panic in callback: {0}")]
    CallbackPanic(String),

    /// `close()` was called on a handle the current thread is still using.
    #[error("cannot close {kind} handle while it is in use by the current thread")]
    ReentrantClose { kind: &'static str },

    /// Error raised by user code inside a callback.
    #[error("{0}")]
    External(String),

    /// Failed to load a native library.
    #[error("failed to load native library: {0}")]
    Load(String),

    #[error("ABI version mismatch: expected {expected}, found {found}")]
    AbiMismatch { expected: u32, found: u32 },
}

impl Error {
    /// Wrap an arbitrary displayable error raised by user code.
    pub fn external(err: impl std::fmt::Display) -> Self {
        Error::External(err.to_string())
    }

    pub fn is_closed_handle(&self) -> bool {
        matches!(self, Error::ClosedHandle { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::ClosedHandle { kind: "table" }.to_string(),
            "table handle is closed"
        );
        assert_eq!(
            Error::CallbackPanic("boom".into()).to_string(),
            "panic in callback: boom"
        );
        assert_eq!(Error::external("nope").to_string(), "nope");
        assert!(Error::ClosedHandle { kind: "string" }.is_closed_handle());
    }
}
