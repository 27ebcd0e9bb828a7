//! Sandbox overlay tier.

use crate::error::Result;
use crate::item::AudioItemId;
use crate::tier::disk::Disk;
use crate::tier::{Access, StorageTier};
use async_trait::async_trait;
use resound_container::AudioFormat;
use std::path::{Path, PathBuf};

/// A per-session isolated overlay over the shared store.
///
/// While a sandbox is active, canonical-format writes land here instead of
/// the shared tier, leaving shared state untouched until the session's
/// changes are explicitly committed (or discarded by deleting the overlay
/// root). [`is_sandboxed`](StorageTier::is_sandboxed) lets callers assert a
/// path is properly isolated before writing.
#[derive(Clone, Debug)]
pub struct SandboxTier {
    disk: Disk,
}

impl SandboxTier {
    /// Create the overlay rooted at `root` (must be absolute, disjoint from
    /// the shared root). The content directory chain is created if missing.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { disk: Disk::new(root)? })
    }
}

#[async_trait]
impl StorageTier for SandboxTier {
    fn name(&self) -> &str {
        "sandbox"
    }

    fn resolve(&self, id: &AudioItemId, format: AudioFormat, access: Access) -> PathBuf {
        self.disk.resolve(id, format, access)
    }

    fn is_sandboxed(&self, path: &Path) -> bool {
        path.starts_with(self.disk.root())
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
