//! Storage tier trait and implementations.
//!
//! A tier is one physical storage location class. All tiers share the same
//! deterministic path scheme under their root:
//!
//! ```text
//! {tier_root}/org/literacybridge/{item_id}/{item_id}.{extension}
//! ```
//!
//! The shape is bit-relevant: externally shared stores are read by other
//! tools that expect exactly this layout.

pub(crate) mod disk;
mod local;
mod sandbox;
mod shared;

pub use self::local::LocalCacheTier;
pub use self::sandbox::SandboxTier;
pub use self::shared::SharedTier;
use crate::error::Result;
use crate::item::AudioItemId;
use async_trait::async_trait;
use resound_container::AudioFormat;
use std::path::{Path, PathBuf};

/// Whether a resolved path is intended to be read or written.
///
/// Resolution itself never touches the filesystem; the access intent only
/// steers *which* tier a layered store resolves into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// One physical storage location class for audio items.
///
/// Handles are constructed once per repository session and immutable
/// thereafter; tier roots are disjoint, so no two tiers ever share ownership
/// of a physical file.
#[async_trait]
pub trait StorageTier: Send + Sync {
    /// Name of the tier (used for logging only).
    fn name(&self) -> &str;

    /// Map `(id, format)` to the path the file would occupy in this tier.
    ///
    /// Pure path construction: performs no I/O and guarantees nothing about
    /// existence. Callers check existence themselves.
    fn resolve(&self, id: &AudioItemId, format: AudioFormat, access: Access) -> PathBuf;

    /// Whether `path` lies inside this tier's isolated overlay. Only the
    /// sandbox tier ever answers `true`; callers use it to assert a path is
    /// properly isolated before writing.
    fn is_sandboxed(&self, _path: &Path) -> bool {
        false
    }

    /// Recursively remove the item's directory. Returns the bytes freed;
    /// an absent directory is not an error (0 bytes).
    async fn delete(&self, id: &AudioItemId) -> Result<u64>;

    /// Sum of file sizes under the item's directory (0 when absent).
    async fn size(&self, id: &AudioItemId) -> Result<u64>;

    /// Ids of every item directory under the content root that contains at
    /// least one file.
    async fn list_ids(&self) -> Result<Vec<AudioItemId>>;
}

/// Nested directories between a tier root and the per-item directories.
pub(crate) const CONTENT_DIRS: [&str; 2] = ["org", "literacybridge"];

pub(crate) fn content_root(root: &Path) -> PathBuf {
    let mut path = root.to_path_buf();
    for dir in CONTENT_DIRS {
        path.push(dir);
    }
    path
}

pub(crate) fn item_dir(root: &Path, id: &AudioItemId) -> PathBuf {
    content_root(root).join(id.as_str())
}

pub(crate) fn item_file(root: &Path, id: &AudioItemId, format: AudioFormat) -> PathBuf {
    item_dir(root, id).join(format!("{}.{}", id, format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_scheme_is_bit_exact() {
        let id = AudioItemId::new("abc123").unwrap();
        assert_eq!(
            item_file(Path::new("/data"), &id, AudioFormat::Wav),
            Path::new("/data/org/literacybridge/abc123/abc123.wav")
        );
        assert_eq!(
            item_file(Path::new("/data"), &id, AudioFormat::Container),
            Path::new("/data/org/literacybridge/abc123/abc123.a18")
        );
    }
}
