//! The repository layer: tiering policy, metadata boundary, and the
//! user-facing [`AudioRepository`] facade.
//!
//! Lower crates provide the mechanisms (tiers, the container codec, the
//! external converter); this crate decides policy: which tier a format
//! lives in, when a conversion happens, what the metadata store is told,
//! and what gets swept away by the cleaner.

mod caching;
pub mod error;
mod metadata;
mod repository;

pub use crate::caching::CachingStore;
pub use crate::metadata::{
    AudioItemHandle, JsonMetadataStore, MemoryMetadataStore, Metadata, MetadataHandle, MetadataStore,
};
pub use crate::repository::{AudioRepository, CleanReport};
