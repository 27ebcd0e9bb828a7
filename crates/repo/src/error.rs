//! Repository error types.
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The last four kinds wrap the inner
//! crates' own error trees.

use derive_more::{Display, Error};
use resound_store::AudioItemId;

/// A repository error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for repository operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The caller asked for a format the repository doesn't handle (unknown
    /// extension, or a non-exportable format on export).
    #[display("unsupported audio format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// An item with this id already has stored content; use update instead.
    #[display("audio item already exists: {_0}")]
    DuplicateItem(#[error(not(source))] AudioItemId),
    /// No stored format exists from which the requested one could be derived.
    #[display("no conversion source available for audio item: {_0}")]
    ConversionSourceMissing(#[error(not(source))] AudioItemId),
    /// Format conversion failed.
    #[display("issue converting audio content")]
    Conversion,
    /// The item has nothing stored in any tier.
    #[display("audio item not found: {_0}")]
    MissingItem(#[error(not(source))] AudioItemId),
    /// The metadata store misbehaved.
    #[display("issue with the metadata store")]
    Metadata,
    /// A storage tier operation failed.
    #[display("issue with tiered storage")]
    Storage,
    /// Container codec failure (corrupt length prefix or trailer).
    #[display("issue with audio container encoding")]
    Container,
    #[display("input/output error")]
    Io(std::io::Error),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Conversions are idempotent given identical inputs, so a transient
        // converter or storage failure is worth a retry. Logical rejections
        // are not.
        match self {
            Self::Conversion | Self::Storage | Self::Io(_) => true,
            Self::UnsupportedFormat(_)
            | Self::DuplicateItem(_)
            | Self::ConversionSourceMissing(_)
            | Self::MissingItem(_)
            | Self::Metadata
            | Self::Container => false,
        }
    }
}
