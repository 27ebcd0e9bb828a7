//! The repository facade: every user-facing operation on audio items.

use crate::caching::CachingStore;
use crate::error::{ErrorKind, Result};
use crate::metadata::MetadataHandle;
use exn::{OptionExt, ResultExt};
use resound_container::{AudioFormat, codec};
use resound_convert::Converter;
use resound_convert::error::ErrorKind as ConvertErrorKind;
use resound_store::gc::{GcBudget, GcReport};
use resound_store::{Access, AudioItemId};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::instrument;

/// Outcome of a [`AudioRepository::clean_unreferenced`] sweep.
///
/// Per-item failures don't abort the sweep; they're collected here so the
/// caller can report them after the fact.
#[derive(Debug, Default)]
pub struct CleanReport {
    pub items_removed: u64,
    pub bytes_freed: u64,
    pub failures: Vec<(AudioItemId, crate::error::Error)>,
}

/// High-level repository over tiered storage, format conversion, and the
/// metadata store.
///
/// # Locking model
///
/// One coarse mutex serialises every mutating operation end-to-end: `add`,
/// `update`, `delete`, materialising `get`s, `export`, the clean sweep, and
/// GC. Read-only resolution runs unguarded. Conversions are idempotent given
/// identical inputs, so callers may retry failed operations freely.
pub struct AudioRepository {
    store: CachingStore,
    converter: Converter,
    metadata: MetadataHandle,
    gc_budget: GcBudget,
    write_lock: Mutex<()>,
}

impl AudioRepository {
    /// Assemble a repository. When the store carries a sandbox overlay, its
    /// write guard is installed into the converter so conversion output can
    /// never land in the shared store.
    pub fn new(store: CachingStore, converter: Converter, metadata: MetadataHandle, gc_budget: GcBudget) -> Self {
        let converter = match store.sandbox_guard() {
            Some(guard) => converter.with_sandbox_guard(guard),
            None => converter,
        };
        Self { store, converter, metadata, gc_budget, write_lock: Mutex::new(()) }
    }

    pub fn metadata_store(&self) -> &MetadataHandle {
        &self.metadata
    }

    /// Formats currently stored for `id`, in catalog order.
    pub async fn stored_formats(&self, id: &AudioItemId) -> Vec<AudioFormat> {
        self.store.stored_formats(id).await
    }

    pub async fn has_item(&self, id: &AudioItemId) -> bool {
        !self.store.stored_formats(id).await.is_empty()
    }

    /// Import a new item from `source` (format taken from its extension).
    ///
    /// The source is copied into its tier (container sources are stripped of
    /// any stale trailer on the way in), the canonical container
    /// representation is derived when not supplied directly, and its
    /// measured duration is committed to the metadata store.
    ///
    /// # Errors
    /// [`ErrorKind::UnsupportedFormat`] for an unknown extension,
    /// [`ErrorKind::DuplicateItem`] when any format is already stored.
    #[instrument(skip(self))]
    pub async fn add(&self, id: &AudioItemId, source: &Path) -> Result<()> {
        let format = source_format(source)?;
        let _guard = self.write_lock.lock().await;
        if !self.store.stored_formats(id).await.is_empty() {
            exn::bail!(ErrorKind::DuplicateItem(id.clone()));
        }
        self.ingest(id, format, source).await
    }

    /// Replace the content of an existing item with `source`, keeping the
    /// stored format set intact: every format that existed before the update
    /// is re-derived from the new content.
    ///
    /// # Errors
    /// [`ErrorKind::MissingItem`] when nothing is stored for `id`.
    #[instrument(skip(self))]
    pub async fn update(&self, id: &AudioItemId, source: &Path) -> Result<()> {
        let format = source_format(source)?;
        let _guard = self.write_lock.lock().await;
        let previous = self.store.stored_formats(id).await;
        if previous.is_empty() {
            exn::bail!(ErrorKind::MissingItem(id.clone()));
        }
        self.store.delete(id).await?;
        self.ingest(id, format, source).await?;
        for format in previous {
            let path = self.store.resolve(id, format, Access::Read).await;
            if !file_present(&path).await {
                self.materialise(id, format).await?;
            }
        }
        Ok(())
    }

    /// Path to `id` in `format`, converting from the best available source
    /// when no stored copy exists yet. Never mutates other formats.
    ///
    /// # Errors
    /// [`ErrorKind::ConversionSourceMissing`] when nothing stored for `id`
    /// can serve as a conversion source.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &AudioItemId, format: AudioFormat) -> Result<PathBuf> {
        let existing = self.store.resolve(id, format, Access::Read).await;
        if file_present(&existing).await {
            return Ok(existing);
        }
        let _guard = self.write_lock.lock().await;
        // Double-check: another task may have materialised it while we
        // waited on the lock.
        let existing = self.store.resolve(id, format, Access::Read).await;
        if file_present(&existing).await {
            return Ok(existing);
        }
        let produced = self.materialise(id, format).await?;
        if format == AudioFormat::Container {
            self.finish_container(id, &produced).await?;
        }
        Ok(produced)
    }

    /// Copy `id` out of the repository to an arbitrary `target` path.
    ///
    /// Only exportable formats leave the repository, and the target's
    /// extension must already match the format — no silent renaming.
    /// Container exports are re-trailed with fresh metadata from the store.
    #[instrument(skip(self))]
    pub async fn export(&self, id: &AudioItemId, target: &Path, format: AudioFormat) -> Result<()> {
        if !format.is_exportable() {
            exn::bail!(ErrorKind::UnsupportedFormat(format.to_string()));
        }
        let expected = format.extension();
        let matches = target.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(expected));
        if !matches {
            return Err(exn::Exn::from(ConvertErrorKind::WrongExtension {
                expected,
                path: target.to_path_buf(),
            }))
            .or_raise(|| ErrorKind::Conversion);
        }

        let stored = self.get(id, format).await?;
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        if format == AudioFormat::Container {
            codec::strip_and_copy(&stored, target).or_raise(|| ErrorKind::Container)?;
            let metadata = self.metadata.get_metadata(id).await?.unwrap_or_default();
            if !metadata.is_empty() {
                codec::append_trailer(target, &metadata.to_trailer()).or_raise(|| ErrorKind::Container)?;
            }
        } else {
            tokio::fs::copy(&stored, target).await.map_err(ErrorKind::Io)?;
        }
        Ok(())
    }

    /// Remove `id` from every owned tier and forget its metadata record.
    ///
    /// An id with no stored files but a surviving metadata record is still
    /// deletable: the record is forgotten and 0 bytes reported.
    ///
    /// # Errors
    /// [`ErrorKind::MissingItem`] when neither tier content nor a metadata
    /// record exists for `id`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &AudioItemId) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let nothing_stored = self.store.stored_formats(id).await.is_empty();
        if nothing_stored && self.metadata.audio_item(id).await?.is_none() {
            exn::bail!(ErrorKind::MissingItem(id.clone()));
        }
        let freed = self.store.delete(id).await?;
        self.metadata.forget(id).await?;
        Ok(freed)
    }

    /// Delete cached content for every id the metadata store has no record
    /// of. Per-item failures are collected, not fatal; the sweep continues.
    #[instrument(skip_all)]
    pub async fn clean_unreferenced(&self) -> Result<CleanReport> {
        let _guard = self.write_lock.lock().await;
        let mut report = CleanReport::default();
        for id in self.store.local_ids().await? {
            let referenced = match self.metadata.audio_item(&id).await {
                Ok(handle) => handle.is_some(),
                Err(e) => {
                    report.failures.push((id, e));
                    continue;
                },
            };
            if referenced {
                continue;
            }
            match self.store.delete(&id).await {
                Ok(bytes) => {
                    tracing::info!(%id, bytes, "Removed unreferenced audio item");
                    report.items_removed += 1;
                    report.bytes_freed += bytes;
                },
                Err(e) => report.failures.push((id, e)),
            }
        }
        Ok(report)
    }

    /// Run the garbage collector over the local cache with the configured
    /// budget.
    pub async fn gc(&self) -> Result<GcReport> {
        let _guard = self.write_lock.lock().await;
        self.store.gc(&self.gc_budget).await
    }

    /// Shared import path for `add` and `update`. Caller holds the write
    /// lock.
    async fn ingest(&self, id: &AudioItemId, format: AudioFormat, source: &Path) -> Result<()> {
        let target = self.store.resolve(id, format, Access::Write).await;
        let container = if format == AudioFormat::Container {
            // Strip any stale trailer the source carries; fresh metadata is
            // appended below.
            codec::strip_and_copy(source, &target).or_raise(|| ErrorKind::Container)?;
            target
        } else {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
            }
            tokio::fs::copy(source, &target).await.map_err(ErrorKind::Io)?;
            self.materialise(id, AudioFormat::Container).await?
        };
        self.finish_container(id, &container).await
    }

    /// Measure the container's duration, commit it to the metadata store,
    /// and append the resulting trailer to the container file.
    async fn finish_container(&self, id: &AudioItemId, container: &Path) -> Result<()> {
        let duration = codec::duration(container).or_raise(|| ErrorKind::Container)?;
        let mut metadata = self.metadata.get_metadata(id).await?.unwrap_or_default();
        metadata.fields.insert("duration".to_string(), duration.to_string());
        self.metadata.commit(id, metadata.clone()).await?;
        codec::append_trailer(container, &metadata.to_trailer()).or_raise(|| ErrorKind::Container)?;
        Ok(())
    }

    /// Produce `(id, format)` from the best available stored source via the
    /// conversion cascade. Caller holds the write lock.
    async fn materialise(&self, id: &AudioItemId, format: AudioFormat) -> Result<PathBuf> {
        let target = self.store.resolve(id, format, Access::Write).await;
        let sources = self.store.existing_sources(id).await;
        let converter = self.converter.clone();
        let raw_id = id.to_string();
        let destination = target.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            converter.find_source_and_convert(&raw_id, format, &destination, Access::Write, |f| {
                sources.get(&f).cloned()
            })
        })
        .await
        .or_raise(|| ErrorKind::Conversion)?;
        match outcome {
            Ok((source_format, _)) => {
                tracing::debug!(%id, %format, source = %source_format, "Materialised via conversion cascade");
                Ok(target)
            },
            Err(e) if matches!(e.deref(), ConvertErrorKind::NoSource(_)) => {
                Err(e).or_raise(|| ErrorKind::ConversionSourceMissing(id.clone()))
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::Conversion),
        }
    }
}

fn source_format(source: &Path) -> Result<AudioFormat> {
    AudioFormat::from_path(source)
        .ok_or_raise(|| ErrorKind::UnsupportedFormat(source.to_string_lossy().into_owned()))
}

async fn file_present(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::metadata::{MemoryMetadataStore, MetadataStore};
    use resound_store::{LocalCacheTier, SandboxTier, SharedTier, TierHandle};
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Stand-in converter: copies its source argument to its target, byte
    /// for byte, so conversion outcomes are fully predictable.
    fn stub_converter(dir: &Path) -> PathBuf {
        let path = dir.join("stub-converter");
        std::fs::write(&path, "#!/bin/sh\nsrc=\"$2\"\nfor dst in \"$@\"; do :; done\ncp \"$src\" \"$dst\"\n")
            .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A minimal valid container: 8-byte payload carrying a 16 kbps class
    /// marker at payload offset 2.
    fn container_bytes() -> Vec<u8> {
        let mut payload = vec![0u8; 8];
        payload[2..4].copy_from_slice(&16_000u16.to_le_bytes());
        let mut bytes = (payload.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&payload);
        bytes
    }

    struct Fixture {
        dir: TempDir,
        repo: AudioRepository,
        metadata: Arc<MemoryMetadataStore>,
    }

    impl Fixture {
        fn new(with_sandbox: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let local = LocalCacheTier::new(dir.path().join("local")).unwrap();
            let shared: TierHandle = Arc::new(SharedTier::new(dir.path().join("shared")).unwrap());
            let sandbox: Option<TierHandle> = with_sandbox
                .then(|| Arc::new(SandboxTier::new(dir.path().join("sandbox")).unwrap()) as TierHandle);
            let store = CachingStore::new(local, shared, sandbox);
            let converter = Converter::at(stub_converter(dir.path()));
            let metadata = Arc::new(MemoryMetadataStore::new());
            let repo = AudioRepository::new(store, converter, metadata.clone(), GcBudget::new(u64::MAX));
            Self { dir, repo, metadata }
        }

        /// Write a source file with a valid container layout (our stub
        /// converter copies bytes verbatim, so every derived file keeps it).
        fn source(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, container_bytes()).unwrap();
            path
        }

        fn id(&self) -> AudioItemId {
            AudioItemId::new("abc123").unwrap()
        }
    }

    #[tokio::test]
    async fn add_stores_source_and_derives_the_container() {
        let f = Fixture::new(false);
        let id = f.id();
        f.repo.add(&id, &f.source("in.wav")).await.unwrap();

        let formats = f.repo.stored_formats(&id).await;
        assert_eq!(formats, vec![AudioFormat::Container, AudioFormat::Wav]);

        // Duration of an 8-byte payload at 16 kbps floors to zero seconds,
        // low quality.
        let metadata = f.metadata.get_metadata(&id).await.unwrap().unwrap();
        assert_eq!(metadata.fields.get("duration").map(String::as_str), Some("0:00l"));

        // The derived container carries the committed trailer.
        let container = f.repo.get(&id, AudioFormat::Container).await.unwrap();
        let trailer = codec::read_trailer(&container).unwrap().unwrap();
        assert_eq!(trailer.fields.get("duration").map(String::as_str), Some("0:00l"));
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_unknown_extensions() {
        let f = Fixture::new(false);
        let id = f.id();
        let source = f.source("in.wav");
        f.repo.add(&id, &source).await.unwrap();

        let err = f.repo.add(&id, &source).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::DuplicateItem(_)));

        let bogus = f.dir.path().join("notes.txt");
        std::fs::write(&bogus, b"not audio").unwrap();
        let other = AudioItemId::new("other").unwrap();
        let err = f.repo.add(&other, &bogus).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn get_is_stable_for_stored_formats() {
        let f = Fixture::new(false);
        let id = f.id();
        f.repo.add(&id, &f.source("in.wav")).await.unwrap();

        let first = f.repo.get(&id, AudioFormat::Wav).await.unwrap();
        let bytes = std::fs::read(&first).unwrap();
        let second = f.repo.get(&id, AudioFormat::Wav).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), bytes);
    }

    #[tokio::test]
    async fn get_converts_missing_formats_from_the_cascade() {
        let f = Fixture::new(false);
        let id = f.id();
        f.repo.add(&id, &f.source("in.a18")).await.unwrap();
        assert_eq!(f.repo.stored_formats(&id).await, vec![AudioFormat::Container]);

        let mp3 = f.repo.get(&id, AudioFormat::Mp3).await.unwrap();
        assert!(mp3.exists());
        assert_eq!(
            f.repo.stored_formats(&id).await,
            vec![AudioFormat::Container, AudioFormat::Mp3]
        );
    }

    #[tokio::test]
    async fn get_without_any_source_reports_the_item() {
        let f = Fixture::new(false);
        let ghost = AudioItemId::new("ghost").unwrap();
        let err = f.repo.get(&ghost, AudioFormat::Mp3).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::ConversionSourceMissing(id) if id == &ghost));
    }

    #[tokio::test]
    async fn update_refreshes_content_but_preserves_the_format_set() {
        let f = Fixture::new(false);
        let id = f.id();
        f.repo.add(&id, &f.source("in.wav")).await.unwrap();
        f.repo.get(&id, AudioFormat::Mp3).await.unwrap();
        let before = f.repo.stored_formats(&id).await;
        assert_eq!(before, vec![AudioFormat::Container, AudioFormat::Wav, AudioFormat::Mp3]);

        f.repo.update(&id, &f.source("replacement.wav")).await.unwrap();
        assert_eq!(f.repo.stored_formats(&id).await, before);

        let missing = AudioItemId::new("missing").unwrap();
        let err = f.repo.update(&missing, &f.source("x.wav")).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::MissingItem(_)));
    }

    #[tokio::test]
    async fn export_rejects_bad_formats_and_mismatched_extensions() {
        let f = Fixture::new(false);
        let id = f.id();
        f.repo.add(&id, &f.source("in.wav")).await.unwrap();

        let err = f.repo.export(&id, &f.dir.path().join("out.wma"), AudioFormat::Wma).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::UnsupportedFormat(_)));

        let err = f.repo.export(&id, &f.dir.path().join("out.ogg"), AudioFormat::Wav).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Conversion));
    }

    #[tokio::test]
    async fn container_export_is_retrailed_with_fresh_metadata() {
        let f = Fixture::new(false);
        let id = f.id();
        f.repo.add(&id, &f.source("in.a18")).await.unwrap();

        let mut metadata = f.metadata.get_metadata(&id).await.unwrap().unwrap();
        metadata.fields.insert("title".into(), "Maize spacing".into());
        f.metadata.commit(&id, metadata).await.unwrap();

        let out = f.dir.path().join("exports/out.a18");
        f.repo.export(&id, &out, AudioFormat::Container).await.unwrap();
        let trailer = codec::read_trailer(&out).unwrap().unwrap();
        assert_eq!(trailer.fields.get("title").map(String::as_str), Some("Maize spacing"));
        // The payload itself is untouched by re-trailing.
        assert_eq!(codec::strip_and_copy(&out, f.dir.path().join("check.a18")).unwrap(), 8);
    }

    #[tokio::test]
    async fn delete_clears_storage_and_metadata() {
        let f = Fixture::new(false);
        let id = f.id();
        f.repo.add(&id, &f.source("in.wav")).await.unwrap();

        let freed = f.repo.delete(&id).await.unwrap();
        assert!(freed > 0);
        assert!(!f.repo.has_item(&id).await);
        assert!(f.metadata.audio_item(&id).await.unwrap().is_none());

        let err = f.repo.delete(&id).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::MissingItem(_)));
    }

    #[tokio::test]
    async fn delete_clears_a_metadata_record_with_no_files() {
        let f = Fixture::new(false);
        let ghost = AudioItemId::new("ghost").unwrap();
        f.metadata.commit(&ghost, crate::metadata::Metadata::default()).await.unwrap();

        assert_eq!(f.repo.delete(&ghost).await.unwrap(), 0);
        assert!(f.metadata.audio_item(&ghost).await.unwrap().is_none());

        let err = f.repo.delete(&ghost).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::MissingItem(_)));
    }

    #[tokio::test]
    async fn failed_container_add_leaves_nothing_stored() {
        let f = Fixture::new(false);
        let id = f.id();
        // Declares 100 payload bytes but carries only 10.
        let mut bytes = u32::to_le_bytes(100).to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        let truncated = f.dir.path().join("truncated.a18");
        std::fs::write(&truncated, &bytes).unwrap();

        let err = f.repo.add(&id, &truncated).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Container));
        // The shared tier must not hold a partial container afterwards.
        assert_eq!(f.repo.stored_formats(&id).await, vec![]);

        // The id is free again: a correct source imports cleanly.
        f.repo.add(&id, &f.source("fixed.a18")).await.unwrap();
        assert_eq!(f.repo.stored_formats(&id).await, vec![AudioFormat::Container]);
    }

    #[tokio::test]
    async fn clean_sweep_removes_exactly_the_unreferenced_items() {
        let f = Fixture::new(false);
        let kept = AudioItemId::new("kept").unwrap();
        let orphan = AudioItemId::new("orphan").unwrap();
        f.repo.add(&kept, &f.source("kept.wav")).await.unwrap();
        f.repo.add(&orphan, &f.source("orphan.wav")).await.unwrap();
        f.metadata.forget(&orphan).await.unwrap();

        let report = f.repo.clean_unreferenced().await.unwrap();
        assert_eq!(report.items_removed, 1);
        assert!(report.bytes_freed > 0);
        assert!(report.failures.is_empty());
        assert!(f.repo.has_item(&kept).await);
        assert!(!f.repo.has_item(&orphan).await);
    }

    #[tokio::test]
    async fn sandboxed_repository_writes_containers_into_the_overlay() {
        let f = Fixture::new(true);
        let id = f.id();
        f.repo.add(&id, &f.source("in.wav")).await.unwrap();

        let container = f.repo.get(&id, AudioFormat::Container).await.unwrap();
        assert!(container.starts_with(f.dir.path().join("sandbox")));
        assert!(!f.dir.path().join("shared/org/literacybridge/abc123").exists());
    }
}
