//! Length-delimited metadata trailer encoding.
//!
//! The trailer sits after the audio payload, past the offset external readers
//! stop at, so the encoding only has to agree with itself. All integers are
//! little-endian to match the container's length prefix:
//!
//! ```text
//! u16 version (currently 1)
//! u32 category count
//!     per category: u16 length, UTF-8 bytes
//! u32 field count
//!     per field: u16 key length, key bytes, u32 value length, value bytes
//! ```

use crate::error::{ErrorKind, Result};
use std::collections::BTreeMap;

/// Current trailer encoding version. Bumped if the layout ever changes;
/// decoders reject versions they don't know.
pub const TRAILER_VERSION: u16 = 1;

/// Serialized metadata appended after a container's audio payload.
///
/// # Examples
///
/// ```
/// use resound_container::Trailer;
///
/// let mut trailer = Trailer::default();
/// trailer.categories.push("health".to_string());
/// trailer.fields.insert("title".to_string(), "Hand washing".to_string());
/// let decoded = Trailer::decode(&trailer.encode().unwrap()).unwrap();
/// assert_eq!(decoded, trailer);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trailer {
    /// Category identifiers the item is filed under.
    pub categories: Vec<String>,
    /// Free-form metadata fields (title, language, duration, ...).
    pub fields: BTreeMap<String, String>,
}

impl Trailer {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.fields.is_empty()
    }

    /// Encode into the length-delimited byte form.
    ///
    /// Fails with [`ErrorKind::Trailer`] if a category or key exceeds the
    /// `u16` length field, or a value the `u32` one.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&TRAILER_VERSION.to_le_bytes());
        out.extend_from_slice(&count(self.categories.len())?.to_le_bytes());
        for category in &self.categories {
            write_short(&mut out, category)?;
        }
        out.extend_from_slice(&count(self.fields.len())?.to_le_bytes());
        for (key, value) in &self.fields {
            write_short(&mut out, key)?;
            let len = u32::try_from(value.len()).map_err(|_| exn::Exn::from(ErrorKind::Trailer))?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        Ok(out)
    }

    /// Decode a trailer previously produced by [`encode`](Self::encode).
    ///
    /// Any structural problem (unknown version, lengths pointing past the
    /// end, invalid UTF-8, leftover bytes) is [`ErrorKind::Trailer`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { bytes, at: 0 };
        let version = cursor.u16()?;
        if version != TRAILER_VERSION {
            exn::bail!(ErrorKind::Trailer);
        }
        let mut trailer = Trailer::default();
        let categories = cursor.u32()?;
        for _ in 0..categories {
            let len = cursor.u16()? as usize;
            trailer.categories.push(cursor.string(len)?);
        }
        let fields = cursor.u32()?;
        for _ in 0..fields {
            let key_len = cursor.u16()? as usize;
            let key = cursor.string(key_len)?;
            let value_len = cursor.u32()? as usize;
            let value = cursor.string(value_len)?;
            trailer.fields.insert(key, value);
        }
        if cursor.at != bytes.len() {
            exn::bail!(ErrorKind::Trailer);
        }
        Ok(trailer)
    }
}

fn count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| exn::Exn::from(ErrorKind::Trailer))
}

fn write_short(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| exn::Exn::from(ErrorKind::Trailer))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl Cursor<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self.at.checked_add(n).filter(|end| *end <= self.bytes.len());
        let Some(end) = end else {
            exn::bail!(ErrorKind::Trailer);
        };
        let slice = &self.bytes[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        // Infallible: take() returned exactly two bytes.
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| exn::Exn::from(ErrorKind::Trailer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trailer {
        let mut trailer = Trailer::default();
        trailer.categories = vec!["agriculture".to_string(), "2-014".to_string()];
        trailer.fields.insert("title".to_string(), "Planting depth".to_string());
        trailer.fields.insert("language".to_string(), "dga".to_string());
        trailer
    }

    #[test]
    fn round_trip() {
        let trailer = sample();
        let encoded = trailer.encode().unwrap();
        assert_eq!(Trailer::decode(&encoded).unwrap(), trailer);
    }

    #[test]
    fn empty_round_trip() {
        let encoded = Trailer::default().encode().unwrap();
        assert_eq!(Trailer::decode(&encoded).unwrap(), Trailer::default());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut encoded = sample().encode().unwrap();
        encoded[0] = 99;
        assert!(Trailer::decode(&encoded).is_err());
    }

    #[test]
    fn rejects_truncation_and_trailing_garbage() {
        let encoded = sample().encode().unwrap();
        assert!(Trailer::decode(&encoded[..encoded.len() - 1]).is_err());
        let mut padded = encoded.clone();
        padded.push(0);
        assert!(Trailer::decode(&padded).is_err());
    }

    #[test]
    fn rejects_invalid_utf8() {
        // version 1, one category of length 2 with invalid UTF-8, zero fields
        let bytes = [1, 0, 1, 0, 0, 0, 2, 0, 0xff, 0xfe, 0, 0, 0, 0];
        assert!(Trailer::decode(&bytes).is_err());
    }
}
