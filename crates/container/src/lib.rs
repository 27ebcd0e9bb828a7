//! The canonical on-disk audio container and the closed audio format catalog.
//!
//! This crate knows two things:
//!
//! - **Formats.** The [`AudioFormat`] enum is the closed set of formats the
//!   repository deals with, each with a canonical file extension and fixed
//!   [`ConversionParams`]. Extension lookup is case-insensitive and total
//!   over the known set.
//! - **The container.** The canonical long-term representation is a
//!   length-prefixed binary container: a little-endian `u32` payload length,
//!   the opaque audio payload, and an optional [`Trailer`] of serialized
//!   metadata appended after the payload. External readers ignore anything
//!   past the declared payload length, which is what makes the trailer safe
//!   to bolt on. The [`codec`] module reads and writes this layout.
//!
//! Nothing here decodes audio samples; payload bytes are opaque.

pub mod codec;
pub mod error;
mod trailer;

pub use crate::trailer::{TRAILER_VERSION, Trailer};

/// A supported audio format.
///
/// The set is closed on purpose: the repository's path scheme, conversion
/// cascade, and export whitelist all iterate over it. [`Self::ALL`] fixes the
/// catalog order, which the conversion source cascade depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AudioFormat {
    /// The canonical length-prefixed container (`.a18`).
    Container,
    /// Uncompressed PCM (`.wav`); preferred transcoding source.
    Wav,
    Mp3,
    Ogg,
    /// Legacy import source only; never exported.
    Wma,
    /// Legacy import source only; never exported.
    Aac,
    /// Legacy import source only; never exported.
    M4a,
}

/// Target parameters handed to the external converter, fixed per format for
/// the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionParams {
    pub sample_rate: u32,
    pub bit_rate: u32,
    pub channels: u8,
}

impl AudioFormat {
    /// Catalog order. The conversion cascade iterates this order (WAV pulled
    /// to the front), so reordering variants changes observable behaviour.
    pub const ALL: [AudioFormat; 7] = [
        AudioFormat::Container,
        AudioFormat::Wav,
        AudioFormat::Mp3,
        AudioFormat::Ogg,
        AudioFormat::Wma,
        AudioFormat::Aac,
        AudioFormat::M4a,
    ];

    /// Formats permitted as final export targets. The legacy formats are
    /// retained only as import/transcoding sources.
    pub const EXPORTABLE: [AudioFormat; 4] =
        [AudioFormat::Container, AudioFormat::Wav, AudioFormat::Mp3, AudioFormat::Ogg];

    /// Canonical lowercase file extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Container => "a18",
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Wma => "wma",
            AudioFormat::Aac => "aac",
            AudioFormat::M4a => "m4a",
        }
    }

    /// Case-insensitive extension lookup. `ext` may carry surrounding
    /// whitespace or a leading dot; unknown extensions return `None` and the
    /// caller decides how loudly to fail.
    ///
    /// # Examples
    ///
    /// ```
    /// use resound_container::AudioFormat;
    ///
    /// assert_eq!(AudioFormat::from_extension("WAV"), Some(AudioFormat::Wav));
    /// assert_eq!(AudioFormat::from_extension(".a18"), Some(AudioFormat::Container));
    /// assert_eq!(AudioFormat::from_extension("flac"), None);
    /// ```
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.');
        Self::ALL.into_iter().find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    /// Detect a format from a file path's extension.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Option<Self> {
        path.as_ref().extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
    }

    /// Conversion parameters for this format. Constant table; the legacy
    /// source formats keep their typical delivery parameters so a transcode
    /// from them never upsamples.
    pub fn params(&self) -> ConversionParams {
        match self {
            AudioFormat::Container => ConversionParams { sample_rate: 16_000, bit_rate: 16_000, channels: 1 },
            AudioFormat::Wav => ConversionParams { sample_rate: 16_000, bit_rate: 256_000, channels: 1 },
            AudioFormat::Mp3 | AudioFormat::Ogg => {
                ConversionParams { sample_rate: 16_000, bit_rate: 32_000, channels: 1 }
            },
            AudioFormat::Wma | AudioFormat::Aac | AudioFormat::M4a => {
                ConversionParams { sample_rate: 44_100, bit_rate: 128_000, channels: 2 }
            },
        }
    }

    pub fn is_exportable(&self) -> bool {
        Self::EXPORTABLE.contains(self)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| exn::Exn::from(crate::error::ErrorKind::UnknownFormat(s.to_string())))
    }
}
