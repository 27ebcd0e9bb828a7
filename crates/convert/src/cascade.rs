//! Source-selection cascade for transcoding.

use crate::error::{ErrorKind, Result};
use resound_container::AudioFormat;
use std::path::PathBuf;

/// Candidate source formats for producing `target`, in the order they must
/// be tried: WAV first (lossless, cheap to transcode), then every other
/// format in catalog order. The target format itself is skipped — it cannot
/// be its own transcoding source.
///
/// # Examples
///
/// ```
/// use resound_container::AudioFormat;
/// use resound_convert::source_candidates;
///
/// let order: Vec<_> = source_candidates(AudioFormat::Mp3).collect();
/// assert_eq!(order[0], AudioFormat::Wav);
/// assert_eq!(order[1], AudioFormat::Container);
/// assert!(!order.contains(&AudioFormat::Mp3));
/// ```
pub fn source_candidates(target: AudioFormat) -> impl Iterator<Item = AudioFormat> {
    std::iter::once(AudioFormat::Wav)
        .chain(AudioFormat::ALL.into_iter().filter(|format| *format != AudioFormat::Wav))
        .filter(move |format| *format != target)
}

/// Short-circuiting search over the cascade.
///
/// `lookup` maps a candidate format to the path of an *existing* file for
/// the item, or `None`. The first hit wins. With no hit in any format the
/// item has no derivable source and the caller is told which item that was.
pub fn find_source(
    id: &str,
    target: AudioFormat,
    mut lookup: impl FnMut(AudioFormat) -> Option<PathBuf>,
) -> Result<(AudioFormat, PathBuf)> {
    for format in source_candidates(target) {
        if let Some(path) = lookup(format) {
            tracing::debug!(item = id, source = %format, path = %path.display(), "Transcoding source selected");
            return Ok((format, path));
        }
    }
    exn::bail!(ErrorKind::NoSource(id.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;

    #[test]
    fn wav_first_then_catalog_order() {
        let order: Vec<_> = source_candidates(AudioFormat::Mp3).collect();
        assert_eq!(order, vec![
            AudioFormat::Wav,
            AudioFormat::Container,
            AudioFormat::Ogg,
            AudioFormat::Wma,
            AudioFormat::Aac,
            AudioFormat::M4a,
        ]);
    }

    #[test]
    fn wav_target_is_not_its_own_source() {
        let order: Vec<_> = source_candidates(AudioFormat::Wav).collect();
        assert_eq!(order, vec![
            AudioFormat::Container,
            AudioFormat::Mp3,
            AudioFormat::Ogg,
            AudioFormat::Wma,
            AudioFormat::Aac,
            AudioFormat::M4a,
        ]);
    }

    #[test]
    fn search_short_circuits_on_the_first_hit() {
        let mut probed = Vec::new();
        let (format, path) = find_source("item-1", AudioFormat::Container, |format| {
            probed.push(format);
            (format == AudioFormat::Ogg).then(|| PathBuf::from("/tier/item-1.ogg"))
        })
        .unwrap();
        assert_eq!(format, AudioFormat::Ogg);
        assert_eq!(path, PathBuf::from("/tier/item-1.ogg"));
        // Wav was tried first, then catalog order up to the hit; nothing after.
        assert_eq!(probed, vec![AudioFormat::Wav, AudioFormat::Mp3, AudioFormat::Ogg]);
    }

    #[test]
    fn exhausted_cascade_names_the_item() {
        let err = find_source("orphan", AudioFormat::Mp3, |_| None).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NoSource(id) if id == "orphan"));
    }
}
