//! Tiered filesystem storage for audio items.
//!
//! An audio item lives in up to three places: a disposable local cache, a
//! shared durable store, and an optional per-session sandbox overlay.
//! Every tier maps an `(item, format)` pair to the same deterministic path
//! shape under its own root, so tiers can be layered without any lookup
//! table. Which tier a given format lands in is a policy question answered
//! one level up — this crate only provides the tiers themselves, plus the
//! size-bounded garbage collector the local cache runs.

pub mod error;
pub mod gc;
mod item;
mod tier;

pub use crate::item::AudioItemId;
pub use crate::tier::{Access, LocalCacheTier, SandboxTier, SharedTier, StorageTier};
use std::sync::Arc;

pub type TierHandle = Arc<dyn StorageTier + Send + Sync>;
