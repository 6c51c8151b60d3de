//! Media kinds and stream descriptors

use pxmarchive::ArchiveFormat;
use std::path::{Path, PathBuf};

/// Coarse nature of a resolved asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Muxed audio/video container
    Video,
    /// Audio only
    Audio,
    /// Still or animated image (GIF, APNG, WebP...)
    Image,
    /// Archive to unpack before decoding
    Bundle,
}

impl MediaKind {
    /// Guess from a file extension or a format name reported by a service
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp4" | "m4v" | "webm" | "mkv" | "mov" | "avi" | "flv" | "3gp" => Some(Self::Video),
            "mp3" | "flac" | "wav" | "ogg" | "oga" | "opus" | "m4a" | "aac" => Some(Self::Audio),
            "gif" | "png" | "apng" | "webp" | "jpg" | "jpeg" | "bmp" => Some(Self::Image),
            "zip" | "tar" | "tgz" | "gz" | "txz" | "xz" => Some(Self::Bundle),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Guess from the content when the name says nothing
    ///
    /// Only archives are recognised by their magic bytes; anything else
    /// returns `fallback`.
    pub fn sniff(path: &Path, fallback: MediaKind) -> Self {
        match Self::from_path(path) {
            Some(kind) => kind,
            None if ArchiveFormat::detect(path).is_ok() => Self::Bundle,
            None => fallback,
        }
    }

    /// Whether frames can be decoded from this kind
    pub fn is_visual(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Image)
    }
}

/// Local file ready for decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub local_path: PathBuf,
    pub media_kind: MediaKind,
    /// Separate audio track shipped alongside the visual file in a bundle
    pub audio_path: Option<PathBuf>,
}

impl StreamDescriptor {
    pub fn new(local_path: impl Into<PathBuf>, media_kind: MediaKind) -> Self {
        Self {
            local_path: local_path.into(),
            media_kind,
            audio_path: None,
        }
    }
}

/// Pick the files to decode out of an unpacked bundle
///
/// The first visual file (in sorted order) is the primary stream, the first
/// audio file becomes its companion track. A bundle holding only audio plays
/// that audio.
pub fn select_bundle_media(files: &[PathBuf]) -> Option<StreamDescriptor> {
    let kind_of = |p: &PathBuf| MediaKind::from_path(p);

    let visual = files
        .iter()
        .find(|p| kind_of(p).is_some_and(|k| k.is_visual()));
    let audio = files
        .iter()
        .find(|p| kind_of(p) == Some(MediaKind::Audio));

    match (visual, audio) {
        (Some(visual), audio) => {
            let media_kind = kind_of(visual)?;
            Some(StreamDescriptor {
                local_path: visual.clone(),
                media_kind,
                audio_path: audio.cloned(),
            })
        }
        (None, Some(audio)) => Some(StreamDescriptor::new(audio.clone(), MediaKind::Audio)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(MediaKind::from_extension("GIF"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_extension(".mp3"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_extension("webm"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_extension("zip"), Some(MediaKind::Bundle));
        assert_eq!(MediaKind::from_extension("bin"), None);
    }

    #[test]
    fn test_select_bundle_media() {
        let files = vec![
            PathBuf::from("/b/README.txt"),
            PathBuf::from("/b/audio/theme.ogg"),
            PathBuf::from("/b/frames.gif"),
        ];
        let stream = select_bundle_media(&files).unwrap();
        assert_eq!(stream.local_path, PathBuf::from("/b/frames.gif"));
        assert_eq!(stream.media_kind, MediaKind::Image);
        assert_eq!(stream.audio_path, Some(PathBuf::from("/b/audio/theme.ogg")));

        let audio_only = vec![PathBuf::from("/b/theme.flac")];
        let stream = select_bundle_media(&audio_only).unwrap();
        assert_eq!(stream.media_kind, MediaKind::Audio);
        assert!(stream.audio_path.is_none());

        assert!(select_bundle_media(&[PathBuf::from("/b/notes.txt")]).is_none());
    }
}
