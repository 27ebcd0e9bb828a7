//! Tiering policy: which physical tier serves which `(format, access)` pair.
//!
//! The rules are small but load-bearing:
//!
//! - Container files belong to the shared durable store. When a sandbox
//!   overlay is configured, container *writes* always land in the sandbox
//!   (the shared store is never written directly), and container *reads*
//!   prefer a sandboxed copy when one exists, falling back to shared.
//! - Every other format is disposable and lives in the local cache.
//!
//! Tiers themselves stay I/O-free on resolution; the read-through existence
//! check happens here.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use resound_container::AudioFormat;
use resound_convert::SandboxGuard;
use resound_store::gc::{GcBudget, GcReport, collect_garbage};
use resound_store::{Access, AudioItemId, LocalCacheTier, StorageTier, TierHandle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Layered storage for audio items.
///
/// Owns one handle per tier; handles are immutable once constructed. The
/// shared tier may be modified concurrently by other processes, so existence
/// answers are best-effort snapshots.
#[derive(Clone)]
pub struct CachingStore {
    local: Arc<LocalCacheTier>,
    shared: TierHandle,
    sandbox: Option<TierHandle>,
}

impl CachingStore {
    pub fn new(local: LocalCacheTier, shared: TierHandle, sandbox: Option<TierHandle>) -> Self {
        Self { local: Arc::new(local), shared, sandbox }
    }

    /// The tier that backs `format` under current policy (sandbox-read
    /// fallthrough is handled in [`Self::resolve`], not here).
    fn tier_for(&self, format: AudioFormat) -> &dyn StorageTier {
        match (format, &self.sandbox) {
            (AudioFormat::Container, Some(sandbox)) => sandbox.as_ref(),
            (AudioFormat::Container, None) => self.shared.as_ref(),
            _ => self.local.as_ref(),
        }
    }

    /// Path where `(id, format)` lives, honouring sandbox read-through:
    /// a container read resolves into the sandbox only when a non-empty
    /// sandboxed copy already exists, and falls back to the shared store
    /// otherwise (an empty sandbox directory does not shadow shared).
    pub async fn resolve(&self, id: &AudioItemId, format: AudioFormat, access: Access) -> PathBuf {
        if format == AudioFormat::Container
            && access == Access::Read
            && let Some(sandbox) = &self.sandbox
        {
            let overlaid = sandbox.resolve(id, format, access);
            if file_present(&overlaid).await {
                return overlaid;
            }
            return self.shared.resolve(id, format, access);
        }
        self.tier_for(format).resolve(id, format, access)
    }

    /// Whether `path` lies inside the sandbox overlay. Always `false` when
    /// no sandbox is configured.
    pub fn is_sandboxed(&self, path: &Path) -> bool {
        self.sandbox.as_ref().is_some_and(|tier| tier.is_sandboxed(path))
    }

    /// Write guard handed to the converter when a sandbox is active: writes
    /// may land in the overlay or in the disposable local cache, never in
    /// the shared store.
    pub fn sandbox_guard(&self) -> Option<SandboxGuard> {
        self.sandbox.as_ref()?;
        let store = self.clone();
        let local_root = self.local.content_root();
        Some(Arc::new(move |path: &Path| store.is_sandboxed(path) || path.starts_with(&local_root)))
    }

    /// Every format for which `(id, format)` currently has a non-empty file,
    /// with the path that read access would resolve to.
    pub async fn existing_sources(&self, id: &AudioItemId) -> HashMap<AudioFormat, PathBuf> {
        let mut sources = HashMap::new();
        for format in AudioFormat::ALL {
            let path = self.resolve(id, format, Access::Read).await;
            if file_present(&path).await {
                sources.insert(format, path);
            }
        }
        sources
    }

    /// Formats currently stored for `id`, in catalog order.
    pub async fn stored_formats(&self, id: &AudioItemId) -> Vec<AudioFormat> {
        let mut formats: Vec<_> = self.existing_sources(id).await.into_keys().collect();
        formats.sort();
        formats
    }

    /// Remove `id` from every tier this store owns the lifecycle of: the
    /// local cache, plus the sandbox when configured or the shared store
    /// otherwise. Returns bytes freed.
    pub async fn delete(&self, id: &AudioItemId) -> Result<u64> {
        let mut freed = self.local.delete(id).await.or_raise(|| ErrorKind::Storage)?;
        let durable = self.sandbox.as_deref().unwrap_or(self.shared.as_ref());
        freed += durable.delete(id).await.or_raise(|| ErrorKind::Storage)?;
        Ok(freed)
    }

    /// Bytes currently stored for `id` (same tier set as [`Self::delete`]).
    pub async fn size(&self, id: &AudioItemId) -> Result<u64> {
        let mut total = self.local.size(id).await.or_raise(|| ErrorKind::Storage)?;
        let durable = self.sandbox.as_deref().unwrap_or(self.shared.as_ref());
        total += durable.size(id).await.or_raise(|| ErrorKind::Storage)?;
        Ok(total)
    }

    /// Ids with content in the local cache tier.
    pub async fn local_ids(&self) -> Result<Vec<AudioItemId>> {
        self.local.list_ids().await.or_raise(|| ErrorKind::Storage)
    }

    /// Run the garbage collector over the local cache tier only; the shared
    /// store's lifecycle is managed externally.
    pub async fn gc(&self, budget: &GcBudget) -> Result<GcReport> {
        collect_garbage(self.local.content_root(), budget).await.or_raise(|| ErrorKind::Storage)
    }
}

async fn file_present(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}
