//! Format conversion through an external converter process.
//!
//! The repository never decodes audio itself. This crate discovers a
//! converter binary on the system (or is pointed at one), invokes it with
//! per-format target parameters, and implements the source-selection
//! cascade: when a requested format doesn't exist yet, which stored format
//! do we transcode from?
//!
//! The cascade prefers WAV — lossless and cheap to transcode — and then
//! falls back through the rest of the catalog in order. That ordering is a
//! policy choice with observable consequences; see [`source_candidates`].

mod cascade;
mod converter;
pub mod error;

pub use crate::cascade::{find_source, source_candidates};
pub use crate::converter::{Converter, SandboxGuard};
