//! Conversion Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A conversion error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("no audio converter detected on your system")]
    ConverterNotFound,
    /// The converter exited with a non-zero exit code (or was killed by a
    /// signal, in which case the code is -1).
    #[display("converter exited with code {code}: {stderr}")]
    ConversionFailed { code: i32, stderr: String },
    /// The converter ran but produced nothing usable.
    #[display("converter produced no output at {}", _0.display())]
    EmptyOutput(#[error(not(source))] PathBuf),
    /// The sandbox write guard tripped.
    #[display("target should have been sandboxed: {}", _0.display())]
    NotSandboxed(#[error(not(source))] PathBuf),
    /// The target path's extension does not match the requested format; the
    /// engine refuses to silently rename.
    #[display("target {} does not match format extension .{expected}", path.display())]
    WrongExtension { expected: &'static str, path: PathBuf },
    /// No existing format could serve as a transcoding source for the item.
    #[display("no conversion source exists in any format for item {_0:?}")]
    NoSource(#[error(not(source))] String),
    /// The container source could not be prepared for transcoding.
    #[display("could not strip container source")]
    Container,
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
        matches!(self, Self::Io(_) | Self::ConversionFailed { .. })
    }
}
