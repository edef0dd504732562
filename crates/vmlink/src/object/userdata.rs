use std::any::Any;
use std::sync::Arc;

use vmlink_abi::Tag;

use super::ObjectRef;
use crate::callback::{self, PinnedData};
use crate::error::Result;
use crate::native;

/// Native userdata carrying host data through a registry token.
#[derive(Clone, Debug)]
pub struct UserData(pub(crate) ObjectRef);

impl UserData {
    pub const TAG: Tag = Tag::UserData;

    /// Registry token attached to this userdata.
    pub fn token(&self) -> Result<usize> {
        let guard = self.0.acquire()?;
        native::check(self.0.api(), unsafe { (self.0.api().userdata_token)(guard.pointer()) })
    }

    /// The host data attached at creation, if it is still pinned.
    pub fn associated_data(&self) -> Result<Option<PinnedData>> {
        Ok(callback::data(self.token()?))
    }

    /// Attached data downcast to `T`.
    pub fn data<T: Any + Send + Sync>(&self) -> Result<Option<Arc<T>>> {
        Ok(self
            .associated_data()?
            .and_then(|data| data.downcast::<T>().ok()))
    }

    pub fn close(&self) -> Result<()> {
        self.0.close()
    }
}
