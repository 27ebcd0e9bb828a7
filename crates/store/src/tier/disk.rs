//! Shared on-disk mechanics for the filesystem tiers.
//!
//! The three tiers differ in role and policy, not in how they touch the
//! disk; all of that lives here once.

use crate::error::{ErrorKind, Result};
use crate::item::AudioItemId;
use crate::tier::{self, Access};
use resound_container::AudioFormat;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Clone, Debug)]
pub(crate) struct Disk {
    root: PathBuf,
}

impl Disk {
    /// Root must be absolute; the content directory chain is created up
    /// front. Non-async on purpose: this happens once per session and it's
    /// not worth the hassle of making tier constructors async.
    pub(crate) fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidRoot(root));
        }
        let content = tier::content_root(&root);
        sync_create_dir(&content).map_err(|e| map_io_error(e, &content))?;
        Ok(Self { root })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn content_root(&self) -> PathBuf {
        tier::content_root(&self.root)
    }

    pub(crate) fn resolve(&self, id: &AudioItemId, format: AudioFormat, _access: Access) -> PathBuf {
        tier::item_file(&self.root, id, format)
    }

    pub(crate) async fn delete(&self, id: &AudioItemId) -> Result<u64> {
        let dir = tier::item_dir(&self.root, id);
        let freed = self.size(id).await?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(freed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(map_io_error(e, &dir))?,
        }
    }

    pub(crate) async fn size(&self, id: &AudioItemId) -> Result<u64> {
        let dir = tier::item_dir(&self.root, id);
        let mut total = 0;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => Err(map_io_error(e, &dir))?,
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io_error(e, &dir))? {
            let metadata = entry.metadata().await.map_err(|e| map_io_error(e, &entry.path()))?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }

    pub(crate) async fn list_ids(&self) -> Result<Vec<AudioItemId>> {
        let content = self.content_root();
        let mut ids = Vec::new();
        let mut entries = match fs::read_dir(&content).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => Err(map_io_error(e, &content))?,
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io_error(e, &content))? {
            let path = entry.path();
            if !entry.file_type().await.map_err(|e| map_io_error(e, &path))?.is_dir() {
                continue;
            }
            // Directory names that can't form a valid id can't have been
            // written by us; skip them rather than fail the whole listing.
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(id) = AudioItemId::new(name) else {
                continue;
            };
            if dir_has_file(&path).await? {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

async fn dir_has_file(dir: &Path) -> Result<bool> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => Err(map_io_error(e, dir))?,
    };
    while let Some(entry) = entries.next_entry().await.map_err(|e| map_io_error(e, dir))? {
        if entry.file_type().await.map_err(|e| map_io_error(e, &entry.path()))?.is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}
