use vmlink_abi::Tag;

use super::ObjectRef;
use crate::error::Result;

/// Immutable native string. Contents are copied out on read.
#[derive(Clone, Debug)]
pub struct VmString(pub(crate) ObjectRef);

impl VmString {
    pub const TAG: Tag = Tag::String;

    pub fn as_bytes(&self) -> Result<Vec<u8>> {
        let guard = self.0.acquire()?;
        let bytes = unsafe { (self.0.api().string_bytes)(guard.pointer()) };
        Ok(unsafe { bytes.as_slice() }.to_vec())
    }

    /// Contents followed by a terminating nul byte.
    pub fn as_bytes_with_nul(&self) -> Result<Vec<u8>> {
        let mut bytes = self.as_bytes()?;
        bytes.push(0);
        Ok(bytes)
    }

    pub fn to_string_lossy(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.as_bytes()?).into_owned())
    }

    /// Address of the underlying native string. Only useful for hashing
    /// and debugging; it cannot be converted back into a string.
    pub fn to_pointer(&self) -> Result<usize> {
        let guard = self.0.acquire()?;
        Ok(unsafe { (self.0.api().string_to_pointer)(guard.pointer()) })
    }

    pub fn close(&self) -> Result<()> {
        self.0.close()
    }
}
