//! Archive format detection
//!
//! Detection looks at the leading bytes first and falls back to the file
//! name, so a bundle saved under an opaque cache name is still recognized.

use crate::error::{ExtractionError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Zip local file header
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
/// Empty zip (end of central directory only)
pub const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
/// Gzip magic bytes
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
/// XZ stream header
pub const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
/// POSIX tar marker, found at [`TAR_MAGIC_OFFSET`]
pub const TAR_MAGIC: &[u8; 5] = b"ustar";
pub const TAR_MAGIC_OFFSET: usize = 257;

const SNIFF_LEN: usize = TAR_MAGIC_OFFSET + TAR_MAGIC.len();

/// Supported archive layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarXz,
}

impl ArchiveFormat {
    /// Detects the format of the file at `path`
    ///
    /// Magic bytes win over the extension.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut header = Vec::with_capacity(SNIFF_LEN);
        File::open(path)
            .and_then(|f| f.take(SNIFF_LEN as u64).read_to_end(&mut header))
            .map_err(|e| ExtractionError::io(path, e))?;

        Self::from_magic_bytes(&header)
            .or_else(|| Self::from_extension(path))
            .ok_or_else(|| ExtractionError::unsupported(path, "unrecognized archive signature"))
    }

    /// Identifies a format from the first bytes of a file
    ///
    /// Gzip and xz streams are assumed to wrap a tar archive.
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&ZIP_EMPTY_MAGIC) {
            return Some(Self::Zip);
        }
        if bytes.starts_with(&XZ_MAGIC) {
            return Some(Self::TarXz);
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Some(Self::TarGz);
        }
        if bytes.len() >= SNIFF_LEN && &bytes[TAR_MAGIC_OFFSET..SNIFF_LEN] == TAR_MAGIC {
            return Some(Self::Tar);
        }
        None
    }

    /// Identifies a format from the file name
    pub fn from_extension(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();

        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
        };
        f.write_str(s)
    }
}
