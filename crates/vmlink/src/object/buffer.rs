use vmlink_abi::Tag;

use super::ObjectRef;
use crate::error::Result;
use crate::native;

/// Fixed-size mutable byte buffer.
#[derive(Clone, Debug)]
pub struct Buffer(pub(crate) ObjectRef);

impl Buffer {
    pub const TAG: Tag = Tag::Buffer;

    pub fn len(&self) -> Result<usize> {
        let guard = self.0.acquire()?;
        Ok(unsafe { (self.0.api().buffer_len)(guard.pointer()) })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fill `out` from `offset`. Fails if the range is out of bounds.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let guard = self.0.acquire()?;
        native::check_none(self.0.api(), unsafe {
            (self.0.api().buffer_read)(guard.pointer(), offset, out.as_mut_ptr(), out.len())
        })
    }

    /// Copy `data` in at `offset`. Fails if the range is out of bounds.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let guard = self.0.acquire()?;
        native::check_none(self.0.api(), unsafe {
            (self.0.api().buffer_write)(guard.pointer(), offset, data.as_ptr(), data.len())
        })
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.len()?];
        self.read(0, &mut out)?;
        Ok(out)
    }

    pub fn close(&self) -> Result<()> {
        self.0.close()
    }
}
