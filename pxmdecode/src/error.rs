//! Decode errors

use std::io;
use std::path::Path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Failures while decoding a local media file
///
/// All variants are terminal for the session that produced them. End of
/// stream is never an error.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The data is malformed or truncated
    #[error("Corrupt media {source_id}: {reason}")]
    Corrupt { source_id: String, reason: String },

    /// No backend understands the container or codec
    #[error("Unsupported codec for {source_id}: {codec}")]
    UnsupportedCodec { source_id: String, codec: String },

    /// Reading the file failed
    #[error("I/O failure on {source_id}: {source}")]
    IoFailure {
        source_id: String,
        #[source]
        source: io::Error,
    },
}

impl DecodeError {
    pub fn corrupt(path: &Path, reason: impl ToString) -> Self {
        Self::Corrupt {
            source_id: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn unsupported(path: &Path, codec: impl ToString) -> Self {
        Self::UnsupportedCodec {
            source_id: path.display().to_string(),
            codec: codec.to_string(),
        }
    }

    /// Truncated reads surface as I/O errors from the codecs but mean the
    /// data is corrupt
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                Self::corrupt(path, error)
            }
            _ => Self::IoFailure {
                source_id: path.display().to_string(),
                source: error,
            },
        }
    }

    pub fn from_image(path: &Path, error: image::ImageError) -> Self {
        use image::ImageError;
        match error {
            ImageError::IoError(e) => Self::from_io(path, e),
            ImageError::Unsupported(e) => Self::unsupported(path, e),
            other => Self::corrupt(path, other),
        }
    }

    pub fn from_symphonia(path: &Path, error: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymphoniaError;
        match error {
            SymphoniaError::IoError(e) => Self::from_io(path, e),
            SymphoniaError::Unsupported(what) => Self::unsupported(path, what),
            other => Self::corrupt(path, other),
        }
    }

    #[cfg(feature = "ffmpeg")]
    pub fn from_ffmpeg(path: &Path, error: ffmpeg_next::Error) -> Self {
        use ffmpeg_next::Error as FfmpegError;
        match error {
            FfmpegError::DecoderNotFound
            | FfmpegError::DemuxerNotFound
            | FfmpegError::StreamNotFound
            | FfmpegError::PatchWelcome => Self::unsupported(path, error),
            FfmpegError::Other { errno } => Self::from_io(path, io::Error::from_raw_os_error(errno)),
            other => Self::corrupt(path, other),
        }
    }

    /// Opening errors: data no demuxer recognises is an unsupported format
    #[cfg(feature = "ffmpeg")]
    pub fn from_ffmpeg_open(path: &Path, error: ffmpeg_next::Error) -> Self {
        match error {
            ffmpeg_next::Error::InvalidData => Self::unsupported(path, "unrecognised container"),
            other => Self::from_ffmpeg(path, other),
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            DecodeError::Corrupt { source_id, .. }
            | DecodeError::UnsupportedCodec { source_id, .. }
            | DecodeError::IoFailure { source_id, .. } => source_id,
        }
    }
}
