use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::models::{OwnerContext, RemoteDescriptor};

/// Records completed uploads with whoever owns the listing data.
///
/// Called once per completed item. A failure here does not undo the upload;
/// the item is flagged as saved remotely but not recorded.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(
        &self,
        descriptor: &RemoteDescriptor,
        owner: &OwnerContext,
    ) -> Result<(), PersistenceError>;
}
