//! Shared durable store tier.

use crate::error::Result;
use crate::item::AudioItemId;
use crate::tier::disk::Disk;
use crate::tier::{Access, StorageTier};
use async_trait::async_trait;
use resound_container::AudioFormat;
use std::path::{Path, PathBuf};

/// The shared durable store, usually a synced or network-mounted location.
///
/// Other processes and machines write here concurrently: a file appearing
/// between an existence check and a read is a valid, non-error outcome, and
/// no lease is ever taken. This tier's lifecycle is externally managed —
/// the garbage collector never touches it.
#[derive(Clone, Debug)]
pub struct SharedTier {
    disk: Disk,
}

impl SharedTier {
    /// Create the tier rooted at `root` (must be absolute). The content
    /// directory chain is created if missing.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { disk: Disk::new(root)? })
    }
}

#[async_trait]
impl StorageTier for SharedTier {
    fn name(&self) -> &str {
        "shared"
    }

    fn resolve(&self, id: &AudioItemId, format: AudioFormat, access: Access) -> PathBuf {
        self.disk.resolve(id, format, access)
    }

    async fn delete(&self, id: &AudioItemId) -> Result<u64> {
        self.disk.delete(id).await
    }

    async fn size(&self, id: &AudioItemId) -> Result<u64> {
        self.disk.size(id).await
    }

    async fn list_ids(&self) -> Result<Vec<AudioItemId>> {
        self.disk.list_ids().await
    }
}
