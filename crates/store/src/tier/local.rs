//! Local disk cache tier.

use crate::error::Result;
use crate::item::AudioItemId;
use crate::tier::disk::Disk;
use crate::tier::{Access, StorageTier};
use async_trait::async_trait;
use resound_container::AudioFormat;
use std::path::{Path, PathBuf};

/// The disposable local cache.
///
/// Holds regenerable, non-canonical formats. Owned exclusively by this
/// process, so it is the only tier the garbage collector is allowed to
/// evict from.
///
/// # Examples
///
/// ```no_run
/// use resound_store::{Access, AudioItemId, LocalCacheTier, StorageTier};
/// use resound_container::AudioFormat;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tier = LocalCacheTier::new("/var/cache/resound")?;
/// let id: AudioItemId = "abc123".parse()?;
/// let path = tier.resolve(&id, AudioFormat::Wav, Access::Read);
/// assert!(path.ends_with("org/literacybridge/abc123/abc123.wav"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalCacheTier {
    disk: Disk,
}

impl LocalCacheTier {
    /// Create the tier rooted at `root` (must be absolute). The content
    /// directory chain is created if missing.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { disk: Disk::new(root)? })
    }

    /// Directory the garbage collector sweeps.
    pub fn content_root(&self) -> PathBuf {
        self.disk.content_root()
    }
}

#[async_trait]
impl StorageTier for LocalCacheTier {
    fn name(&self) -> &str {
        "local-cache"
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

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> AudioItemId {
        AudioItemId::new(s).unwrap()
    }

    #[test]
    fn requires_absolute_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalCacheTier::new(dir.path()).is_ok());
        assert!(LocalCacheTier::new("relative/path").is_err());
    }

    #[test]
    fn resolve_never_touches_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let tier = LocalCacheTier::new(dir.path()).unwrap();
        let path = tier.resolve(&id("ghost"), AudioFormat::Mp3, Access::Write);
        assert_eq!(path, dir.path().join("org/literacybridge/ghost/ghost.mp3"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn size_and_delete_cover_the_item_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tier = LocalCacheTier::new(dir.path()).unwrap();
        let item = id("abc123");
        let wav = tier.resolve(&item, AudioFormat::Wav, Access::Write);
        let mp3 = tier.resolve(&item, AudioFormat::Mp3, Access::Write);
        std::fs::create_dir_all(wav.parent().unwrap()).unwrap();
        std::fs::write(&wav, vec![0u8; 100]).unwrap();
        std::fs::write(&mp3, vec![0u8; 50]).unwrap();

        assert_eq!(tier.size(&item).await.unwrap(), 150);
        assert_eq!(tier.delete(&item).await.unwrap(), 150);
        assert!(!wav.exists());
        assert_eq!(tier.size(&item).await.unwrap(), 0);
        // Deleting an absent item is not an error.
        assert_eq!(tier.delete(&item).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_ids_skips_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        let tier = LocalCacheTier::new(dir.path()).unwrap();
        let full = tier.resolve(&id("full"), AudioFormat::Wav, Access::Write);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, b"audio").unwrap();
        std::fs::create_dir_all(dir.path().join("org/literacybridge/empty")).unwrap();

        assert_eq!(tier.list_ids().await.unwrap(), vec![id("full")]);
    }
}
