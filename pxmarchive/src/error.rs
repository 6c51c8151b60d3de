//! Error types for archive extraction

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Errors that can occur while unpacking an archive
///
/// Extraction is not transactional: files written before the error stay in
/// the destination directory.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The file is not a zip, tar, tar.gz or tar.xz archive
    #[error("Unsupported archive format for {archive}: {reason}")]
    UnsupportedFormat { archive: String, reason: String },

    /// The archive stream could not be read
    #[error("Corrupt archive {archive}: {reason}")]
    Corrupt { archive: String, reason: String },

    /// An entry would be written outside of the destination directory
    #[error("Entry '{entry}' of {archive} escapes the destination directory")]
    PathTraversalRejected { archive: String, entry: String },

    /// Writing to the destination failed
    #[error("I/O error while extracting {archive}: {source}")]
    Io {
        archive: String,
        #[source]
        source: io::Error,
    },
}

impl ExtractionError {
    pub(crate) fn unsupported(archive: &Path, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            archive: archive.display().to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(archive: &Path, reason: impl ToString) -> Self {
        Self::Corrupt {
            archive: archive.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn traversal(archive: &Path, entry: impl Into<String>) -> Self {
        Self::PathTraversalRejected {
            archive: archive.display().to_string(),
            entry: entry.into(),
        }
    }

    pub(crate) fn io(archive: &Path, source: io::Error) -> Self {
        Self::Io {
            archive: archive.display().to_string(),
            source,
        }
    }

    /// Archive the error relates to
    pub fn archive(&self) -> &str {
        match self {
            Self::UnsupportedFormat { archive, .. }
            | Self::Corrupt { archive, .. }
            | Self::PathTraversalRejected { archive, .. }
            | Self::Io { archive, .. } => archive,
        }
    }
}
