//! Metadata store boundary.
//!
//! The repository does not own item metadata; it reads and commits through
//! this trait and stays agnostic about where records actually live. The
//! store is the source of truth for *logical* existence (the clean sweep
//! keys off it), while the storage tiers are the source of truth for
//! *physical* existence.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use resound_container::Trailer;
use resound_store::AudioItemId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Descriptive metadata for one audio item.
///
/// `fields` are free-form key/value pairs; `categories` is an ordered list
/// of taxonomy labels. Both are embedded verbatim into container trailers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.categories.is_empty()
    }

    pub fn to_trailer(&self) -> Trailer {
        Trailer { categories: self.categories.clone(), fields: self.fields.clone() }
    }
}

impl From<Trailer> for Metadata {
    fn from(trailer: Trailer) -> Self {
        Self { fields: trailer.fields, categories: trailer.categories }
    }
}

/// A metadata store's view of one registered audio item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioItemHandle {
    pub id: AudioItemId,
    /// When metadata for this item was last committed.
    pub committed_at: OffsetDateTime,
}

pub type MetadataHandle = Arc<dyn MetadataStore + Send + Sync>;

/// Source of truth for item metadata and logical existence.
///
/// Implementations may be concurrently read; the repository serialises its
/// own mutations, so stores only need interior mutability, not their own
/// transaction model.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Metadata for `id`, or `None` when the item is unknown.
    async fn get_metadata(&self, id: &AudioItemId) -> Result<Option<Metadata>>;

    /// Create or replace the metadata record for `id`.
    async fn commit(&self, id: &AudioItemId, metadata: Metadata) -> Result<()>;

    /// The item's registration record, or `None` when the item is unknown.
    /// An item with a handle is referenced; cached content for an id with no
    /// handle is fair game for the clean sweep.
    async fn audio_item(&self, id: &AudioItemId) -> Result<Option<AudioItemHandle>>;

    /// Every registered item id.
    async fn list_item_ids(&self) -> Result<Vec<AudioItemId>>;

    /// Drop the record for `id`. Unknown ids are not an error.
    async fn forget(&self, id: &AudioItemId) -> Result<()>;
}

#[derive(Clone, Debug)]
struct Record {
    metadata: Metadata,
    committed_at: OffsetDateTime,
}

/// In-memory metadata store. No persistence; suited to tests and one-shot
/// programmatic use.
#[derive(Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<AudioItemId, Record>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get_metadata(&self, id: &AudioItemId) -> Result<Option<Metadata>> {
        Ok(self.records.read().await.get(id).map(|r| r.metadata.clone()))
    }

    async fn commit(&self, id: &AudioItemId, metadata: Metadata) -> Result<()> {
        let record = Record { metadata, committed_at: OffsetDateTime::now_utc() };
        self.records.write().await.insert(id.clone(), record);
        Ok(())
    }

    async fn audio_item(&self, id: &AudioItemId) -> Result<Option<AudioItemHandle>> {
        Ok(self
            .records
            .read()
            .await
            .get(id)
            .map(|r| AudioItemHandle { id: id.clone(), committed_at: r.committed_at }))
    }

    async fn list_item_ids(&self) -> Result<Vec<AudioItemId>> {
        let mut ids: Vec<_> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn forget(&self, id: &AudioItemId) -> Result<()> {
        self.records.write().await.remove(id);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct JsonRecord {
    metadata: Metadata,
    #[serde(with = "time::serde::rfc3339")]
    committed_at: OffsetDateTime,
}

/// Metadata store persisted as a single JSON sidecar file.
///
/// The whole map is held in memory and rewritten on every commit; fine for
/// the catalogue sizes this repository serves. Ids are stored as plain
/// strings and re-validated on load.
pub struct JsonMetadataStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, JsonRecord>>,
}

impl JsonMetadataStore {
    /// Open (or lazily create) the sidecar at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Metadata)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(ErrorKind::Io(e).into()),
        };
        Ok(Self { path, records: RwLock::new(records) })
    }

    async fn persist(&self, records: &BTreeMap<String, JsonRecord>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records).or_raise(|| ErrorKind::Metadata)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        // Write-then-rename so a crash mid-write never clobbers the sidecar.
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, &bytes).await.map_err(ErrorKind::Io)?;
        tokio::fs::rename(&staging, &self.path).await.map_err(ErrorKind::Io)?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn get_metadata(&self, id: &AudioItemId) -> Result<Option<Metadata>> {
        Ok(self.records.read().await.get(id.as_str()).map(|r| r.metadata.clone()))
    }

    async fn commit(&self, id: &AudioItemId, metadata: Metadata) -> Result<()> {
        let mut records = self.records.write().await;
        let record = JsonRecord { metadata, committed_at: OffsetDateTime::now_utc() };
        records.insert(id.as_str().to_string(), record);
        self.persist(&records).await
    }

    async fn audio_item(&self, id: &AudioItemId) -> Result<Option<AudioItemHandle>> {
        Ok(self
            .records
            .read()
            .await
            .get(id.as_str())
            .map(|r| AudioItemHandle { id: id.clone(), committed_at: r.committed_at }))
    }

    async fn list_item_ids(&self) -> Result<Vec<AudioItemId>> {
        self.records
            .read()
            .await
            .keys()
            .map(|raw| AudioItemId::new(raw.clone()).or_raise(|| ErrorKind::Metadata))
            .collect()
    }

    async fn forget(&self, id: &AudioItemId) -> Result<()> {
        let mut records = self.records.write().await;
        if records.remove(id.as_str()).is_some() {
            self.persist(&records).await?;
        }
        Ok(())
    }
}
