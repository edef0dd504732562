use vmlink_abi::Tag;

use super::ObjectRef;
use crate::error::Result;

/// Native coroutine. Only lifecycle and marshaling are supported here.
#[derive(Clone, Debug)]
pub struct Thread(pub(crate) ObjectRef);

impl Thread {
    pub const TAG: Tag = Tag::Thread;

    pub fn is_closed(&self) -> bool {
        self.0.handle().is_closed()
    }

    pub fn close(&self) -> Result<()> {
        self.0.close()
    }
}
