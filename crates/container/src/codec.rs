//! Reading and writing the length-prefixed container layout.
//!
//! Layout, bit-exact: bytes `[0..4)` are a little-endian `u32` payload length
//! `L`, bytes `[4..4+L)` are opaque audio, bytes `[4+L..EOF)` are an optional
//! [`Trailer`]. Readers that only want audio must never read past `4 + L`.
//!
//! All functions here use synchronous I/O; callers in async contexts wrap
//! them in a blocking task.

use crate::Trailer;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::instrument;

/// Size of the little-endian payload length prefix.
pub const LENGTH_PREFIX: u64 = 4;
/// Offset of the `u16` bits-per-second class field, relative to the payload.
const BPS_OFFSET: u64 = 2;
/// Bits-per-second classes at or below this are the low-quality bucket.
const LOW_QUALITY_MAX_BPS: u16 = 16_000;

/// Read the declared payload length of a container file.
pub fn payload_length(path: impl AsRef<Path>) -> Result<u32> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(ErrorKind::Io)?;
    read_length(&mut file, path)
}

fn read_length(reader: &mut impl Read, path: &Path) -> Result<u32> {
    let mut prefix = [0u8; LENGTH_PREFIX as usize];
    reader.read_exact(&mut prefix).or_raise(|| ErrorKind::Truncated(path.to_path_buf()))?;
    Ok(u32::from_le_bytes(prefix))
}

/// Copy a container file while discarding any metadata trailer.
///
/// Reads the length prefix from `source` and copies exactly `4 + L` bytes to
/// `dest`, so the destination contains audio only. Returns the payload
/// length. Parent directories of `dest` are created as needed.
///
/// The copy goes through a staging file in the destination directory and is
/// renamed into place only once complete: a truncated source must never
/// leave a corrupt partial file at `dest`, which can be a shared location
/// other readers already watch.
///
/// # Errors
/// [`ErrorKind::Truncated`] if `source` is shorter than the prefix, or
/// [`ErrorKind::LengthMismatch`] if it is shorter than `4 + L`.
#[instrument(skip_all, fields(source = %source.as_ref().display(), dest = %dest.as_ref().display()))]
pub fn strip_and_copy(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<u64> {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    let mut reader = BufReader::new(File::open(source).map_err(ErrorKind::Io)?);
    let declared = read_length(&mut reader, source)? as u64;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(ErrorKind::Io)?;
    }
    let staging = staging_path(dest);
    match copy_payload(&mut reader, &staging, declared) {
        Ok(()) => {
            std::fs::rename(&staging, dest).map_err(ErrorKind::Io)?;
            tracing::debug!(payload = declared, "Copied container payload, trailer dropped");
            Ok(declared)
        },
        Err(e) => {
            _ = std::fs::remove_file(&staging);
            Err(e)
        },
    }
}

fn staging_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    name.into()
}

fn copy_payload(reader: &mut impl Read, staging: &Path, declared: u64) -> Result<()> {
    let mut writer = BufWriter::new(File::create(staging).map_err(ErrorKind::Io)?);
    writer.write_all(&u32::to_le_bytes(declared as u32)).map_err(ErrorKind::Io)?;
    let copied = std::io::copy(&mut reader.take(declared), &mut writer).map_err(ErrorKind::Io)?;
    if copied != declared {
        exn::bail!(ErrorKind::LengthMismatch { declared, actual: copied });
    }
    writer.flush().map_err(ErrorKind::Io)?;
    Ok(())
}

/// Append a serialized metadata trailer after the existing payload bytes.
///
/// The payload already present is not touched. The append happens in place:
/// a write failure part-way through can leave a corrupt *trailer*, but never
/// corrupt audio, because readers stop at the declared payload length.
/// Strip-then-append is the way to refresh a trailer.
#[instrument(skip_all, fields(dest = %dest.as_ref().display()))]
pub fn append_trailer(dest: impl AsRef<Path>, trailer: &Trailer) -> Result<()> {
    let bytes = trailer.encode()?;
    let mut file = OpenOptions::new().append(true).open(dest.as_ref()).map_err(ErrorKind::Io)?;
    file.write_all(&bytes).map_err(ErrorKind::Io)?;
    tracing::debug!(bytes = bytes.len(), "Metadata trailer appended");
    Ok(())
}

/// Decode the metadata trailer of a container file, if one is present.
///
/// Returns `None` when the file ends exactly at `4 + L`.
pub fn read_trailer(path: impl AsRef<Path>) -> Result<Option<Trailer>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(ErrorKind::Io)?;
    let declared = read_length(&mut file, path)? as u64;
    let total = file.metadata().map_err(ErrorKind::Io)?.len();
    let audio_end = LENGTH_PREFIX + declared;
    if total < audio_end {
        exn::bail!(ErrorKind::LengthMismatch { declared, actual: total.saturating_sub(LENGTH_PREFIX) });
    }
    if total == audio_end {
        return Ok(None);
    }
    file.seek(SeekFrom::Start(audio_end)).map_err(ErrorKind::Io)?;
    let mut bytes = Vec::with_capacity((total - audio_end) as usize);
    file.read_to_end(&mut bytes).map_err(ErrorKind::Io)?;
    Trailer::decode(&bytes).map(Some)
}

/// Quality bucket derived from the container's bits-per-second class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quality {
    Low,
    High,
}

impl Quality {
    /// Single-character marker appended to formatted durations.
    pub fn marker(&self) -> char {
        match self {
            Quality::Low => 'l',
            Quality::High => 'h',
        }
    }
}

/// Whole-second duration of a container's payload, with its quality bucket.
///
/// Displays as `M:SSq`, e.g. `2:05l`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Duration {
    pub seconds: u64,
    pub quality: Quality,
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:02}{}", self.seconds / 60, self.seconds % 60, self.quality.marker())
    }
}

/// Derive the duration of a container file.
///
/// Reads the payload length and the `u16` little-endian bits-per-second
/// class at payload offset 2, then computes `payload_bytes * 8 / bps` with
/// integer (floor) truncation. Containers at or below 16 kbps are marked
/// [`Quality::Low`], everything above [`Quality::High`].
pub fn duration(path: impl AsRef<Path>) -> Result<Duration> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(ErrorKind::Io)?;
    let declared = read_length(&mut file, path)? as u64;
    file.seek(SeekFrom::Start(LENGTH_PREFIX + BPS_OFFSET)).map_err(ErrorKind::Io)?;
    let mut field = [0u8; 2];
    file.read_exact(&mut field).or_raise(|| ErrorKind::Truncated(path.to_path_buf()))?;
    let bps = u16::from_le_bytes(field);
    if bps == 0 {
        exn::bail!(ErrorKind::ZeroBitrate(path.to_path_buf()));
    }
    let quality = if bps <= LOW_QUALITY_MAX_BPS { Quality::Low } else { Quality::High };
    Ok(Duration { seconds: declared * 8 / u64::from(bps), quality })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;

    /// Build container bytes with the given payload; the bits-per-second
    /// class lands at payload offset 2.
    fn container_bytes(payload: &[u8]) -> Vec<u8> {
        let mut bytes = u32::to_le_bytes(payload.len() as u32).to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    fn payload_with_bps(len: usize, bps: u16) -> Vec<u8> {
        assert!(len >= 4);
        let mut payload = vec![0u8; len];
        payload[2..4].copy_from_slice(&bps.to_le_bytes());
        payload
    }

    fn write_temp(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn strip_and_copy_drops_the_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let payload = payload_with_bps(64, 16_000);
        let mut bytes = container_bytes(&payload);
        bytes.extend_from_slice(b"TRAILING METADATA");
        let source = write_temp(&dir, "source.a18", &bytes);
        let dest = dir.path().join("nested/dir/dest.a18");

        assert_eq!(strip_and_copy(&source, &dest).unwrap(), 64);
        assert_eq!(std::fs::read(&dest).unwrap(), container_bytes(&payload));
    }

    #[test]
    fn strip_and_copy_is_idempotent_without_a_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = container_bytes(&payload_with_bps(32, 16_000));
        let source = write_temp(&dir, "source.a18", &bytes);
        let dest = dir.path().join("dest.a18");
        strip_and_copy(&source, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), bytes);
    }

    #[test]
    fn strip_and_copy_rejects_short_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "tiny.a18", &[1, 2]);
        let err = strip_and_copy(&source, dir.path().join("out.a18")).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Truncated(_)));
    }

    #[test]
    fn strip_and_copy_rejects_declared_length_past_eof() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = u32::to_le_bytes(100).to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        let source = write_temp(&dir, "short.a18", &bytes);
        let dest = dir.path().join("out.a18");
        let err = strip_and_copy(&source, &dest).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::LengthMismatch { declared: 100, actual: 10 }));
    }

    #[test]
    fn failed_strip_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = u32::to_le_bytes(100).to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        let source = write_temp(&dir, "short.a18", &bytes);
        let dest = dir.path().join("nested/out.a18");

        assert!(strip_and_copy(&source, &dest).is_err());
        // Neither the destination nor its staging file may exist.
        assert!(!dest.exists());
        assert!(std::fs::read_dir(dest.parent().unwrap()).unwrap().next().is_none());

        // Retrying with a valid source works in place.
        let good = write_temp(&dir, "good.a18", &container_bytes(&payload_with_bps(8, 16_000)));
        assert_eq!(strip_and_copy(&good, &dest).unwrap(), 8);
        assert!(dest.exists());
    }

    #[test]
    fn append_then_read_trailer_round_trips_without_touching_audio() {
        let dir = tempfile::tempdir().unwrap();
        let audio = container_bytes(&payload_with_bps(16, 16_000));
        let path = write_temp(&dir, "item.a18", &audio);

        let mut trailer = Trailer::default();
        trailer.fields.insert("title".to_string(), "Crop rotation".to_string());
        append_trailer(&path, &trailer).unwrap();

        assert_eq!(read_trailer(&path).unwrap(), Some(trailer));
        assert_eq!(&std::fs::read(&path).unwrap()[..audio.len()], &audio[..]);
    }

    #[test]
    fn read_trailer_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "plain.a18", &container_bytes(&payload_with_bps(8, 16_000)));
        assert_eq!(read_trailer(&path).unwrap(), None);
    }

    #[test]
    fn duration_floors_and_buckets() {
        let dir = tempfile::tempdir().unwrap();
        // 40_000 payload bytes at 16_000 bps: 320_000 bits / 16_000 = 20s, low bucket.
        let path = write_temp(&dir, "low.a18", &container_bytes(&payload_with_bps(40_000, 16_000)));
        let d = duration(&path).unwrap();
        assert_eq!((d.seconds, d.quality), (20, Quality::Low));
        assert_eq!(d.to_string(), "0:20l");

        // 48_003 bytes at 32_000 bps: 384_024 / 32_000 truncates to 12s, high bucket.
        let path = write_temp(&dir, "high.a18", &container_bytes(&payload_with_bps(48_003, 32_000)));
        let d = duration(&path).unwrap();
        assert_eq!((d.seconds, d.quality), (12, Quality::High));
        assert_eq!(d.to_string(), "0:12h");
    }

    #[test]
    fn duration_rejects_zero_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "zero.a18", &container_bytes(&payload_with_bps(8, 0)));
        assert!(matches!(duration(&path).unwrap_err().deref(), ErrorKind::ZeroBitrate(_)));
    }

    #[test]
    fn duration_formats_minutes() {
        let d = Duration { seconds: 125, quality: Quality::Low };
        assert_eq!(d.to_string(), "2:05l");
    }
}
