//! Configuration error types.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A provider failed or a value didn't deserialize.
    #[display("unable to load configuration")]
    Figment(figment::Error),
    /// The merged configuration is structurally fine but semantically wrong
    /// (relative roots, overlapping tier directories, and so on).
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_kind_implements_error_without_a_source() {
        let kind = ErrorKind::Invalid("roots overlap".to_string());
        assert!(std::error::Error::source(&kind).is_none());
        assert_eq!(kind.to_string(), "invalid configuration: roots overlap");
    }
}
