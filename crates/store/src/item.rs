//! Audio item identifiers.

use crate::error::{ErrorKind, Result};
use std::fmt;

/// An opaque, globally unique identifier for one logical audio asset.
///
/// The id is used verbatim as a path component in every storage tier, so
/// construction validates it can never escape a tier root: no separators,
/// no `.`/`..`, no NUL bytes, non-empty. Stable for the lifetime of the
/// asset.
///
/// # Examples
///
/// ```
/// use resound_store::AudioItemId;
///
/// let id: AudioItemId = "LB-2_uzz71upwvs_j".parse().unwrap();
/// assert_eq!(id.as_str(), "LB-2_uzz71upwvs_j");
/// assert!("../escape".parse::<AudioItemId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AudioItemId(String);

impl AudioItemId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
        if !valid {
            exn::bail!(ErrorKind::InvalidItemId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AudioItemId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for AudioItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
