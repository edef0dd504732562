use vmlink_abi::Tag;

use super::ObjectRef;
use crate::error::Result;

/// Error value raised inside the VM.
#[derive(Clone, Debug)]
pub struct ScriptError(pub(crate) ObjectRef);

impl ScriptError {
    pub const TAG: Tag = Tag::Error;

    pub fn message(&self) -> Result<String> {
        let guard = self.0.acquire()?;
        let bytes = unsafe { (self.0.api().error_message)(guard.pointer()) };
        Ok(String::from_utf8_lossy(unsafe { bytes.as_slice() }).into_owned())
    }

    pub fn close(&self) -> Result<()> {
        self.0.close()
    }
}
