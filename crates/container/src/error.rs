//! Container Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A container codec error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file ends before the declared payload (or before the length
    /// prefix itself). The file is corrupt or not a container at all.
    #[display("container truncated: {}", _0.display())]
    Truncated(#[error(not(source))] PathBuf),
    /// The declared payload length does not fit inside the file.
    #[display("declared payload of {declared} bytes, only {actual} present")]
    LengthMismatch { declared: u64, actual: u64 },
    /// The trailer bytes could not be encoded or decoded.
    #[display("invalid metadata trailer")]
    Trailer,
    /// The bits-per-second class field is zero; duration is undefined.
    #[display("container declares a zero bitrate class: {}", _0.display())]
    ZeroBitrate(#[error(not(source))] PathBuf),
    /// Not a member of the format catalog.
    #[display("unknown audio format: {_0:?}")]
    UnknownFormat(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
