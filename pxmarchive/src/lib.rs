//! # pxmarchive - Extraction of downloaded bundles
//!
//! Unpacks zip, tar, tar.gz and tar.xz archives into a destination
//! directory and returns the list of regular files written.
//!
//! Every entry path is validated before anything is written: absolute
//! names, `..` components and links pointing outside of the destination
//! abort the extraction with [`ExtractionError::PathTraversalRejected`].
//! Extraction is not transactional; callers that need atomicity extract
//! into a staging directory and rename it.
//!
//! ```no_run
//! use std::path::Path;
//!
//! let files = pxmarchive::extract(Path::new("bundle.tar.xz"), Path::new("out"))?;
//! for file in files {
//!     println!("{}", file.display());
//! }
//! # Ok::<(), pxmarchive::ExtractionError>(())
//! ```

mod error;
mod format;
mod path;
mod tar_archive;
mod zip_archive;

pub use error::{ExtractionError, Result};
pub use format::ArchiveFormat;

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default per-entry size cap (1 GiB)
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 1024 * 1024 * 1024;

/// Extraction options
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Largest uncompressed entry accepted, `None` disables the check
    pub max_entry_bytes: Option<u64>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_entry_bytes: Some(DEFAULT_MAX_ENTRY_BYTES),
        }
    }
}

/// Extracts `archive` into `destination` with default options
pub fn extract(archive: &Path, destination: &Path) -> Result<Vec<PathBuf>> {
    extract_with(archive, destination, &ExtractOptions::default())
}

/// Extracts `archive` into `destination`
///
/// The destination is created if needed. The format is detected from the
/// archive content, then from its name.
pub fn extract_with(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<Vec<PathBuf>> {
    let format = ArchiveFormat::detect(archive)?;
    info!(
        archive = %archive.display(),
        destination = %destination.display(),
        %format,
        "Extracting archive"
    );

    fs::create_dir_all(destination).map_err(|e| ExtractionError::io(archive, e))?;
    let canonical_destination = destination
        .canonicalize()
        .map_err(|e| ExtractionError::io(archive, e))?;

    let mut sink = EntryWriter {
        archive,
        destination: canonical_destination,
        max_entry_bytes: options.max_entry_bytes,
        written: Vec::new(),
    };

    let file = File::open(archive).map_err(|e| ExtractionError::io(archive, e))?;
    match format {
        ArchiveFormat::Zip => zip_archive::extract(file, &mut sink)?,
        ArchiveFormat::Tar => tar_archive::extract(file, &mut sink)?,
        ArchiveFormat::TarGz => tar_archive::extract(flate2::read::GzDecoder::new(file), &mut sink)?,
        ArchiveFormat::TarXz => tar_archive::extract(xz2::read::XzDecoder::new(file), &mut sink)?,
    }

    info!(
        archive = %archive.display(),
        files = sink.written.len(),
        "Archive extracted"
    );
    Ok(sink.written)
}

/// Writes validated entries below the destination
pub(crate) struct EntryWriter<'a> {
    archive: &'a Path,
    destination: PathBuf,
    max_entry_bytes: Option<u64>,
    written: Vec<PathBuf>,
}

impl EntryWriter<'_> {
    pub(crate) fn archive(&self) -> &Path {
        self.archive
    }

    fn target(&self, entry_name: &str) -> Result<Option<PathBuf>> {
        path::entry_destination(self.archive, &self.destination, entry_name)
    }

    pub(crate) fn directory(&mut self, entry_name: &str) -> Result<()> {
        if let Some(target) = self.target(entry_name)? {
            fs::create_dir_all(&target).map_err(|e| ExtractionError::io(self.archive, e))?;
            path::ensure_inside(self.archive, &self.destination, &target, entry_name)?;
        }
        Ok(())
    }

    /// Copies one regular file; reader errors are reported as corruption
    pub(crate) fn file(&mut self, entry_name: &str, reader: &mut dyn Read) -> Result<()> {
        let Some(target) = self.target(entry_name)? else {
            return Ok(());
        };
        self.prepare_parent(&target, entry_name)?;

        let mut out = File::create(&target).map_err(|e| ExtractionError::io(self.archive, e))?;
        let copied = copy_limited(reader, &mut out, self.max_entry_bytes).map_err(|e| match e {
            CopyError::Read(e) => ExtractionError::corrupt(self.archive, format!("{entry_name}: {e}")),
            CopyError::Write(e) => ExtractionError::io(self.archive, e),
            CopyError::TooLarge(limit) => ExtractionError::corrupt(
                self.archive,
                format!("{entry_name}: entry larger than {limit} bytes"),
            ),
        })?;

        debug!(entry = entry_name, bytes = copied, "Extracted entry");
        self.written.push(target);
        Ok(())
    }

    pub(crate) fn symlink(&mut self, entry_name: &str, link_target: &Path) -> Result<()> {
        let Some(target) = self.target(entry_name)? else {
            return Ok(());
        };
        if link_target.is_absolute() {
            return Err(ExtractionError::traversal(self.archive, entry_name));
        }
        self.prepare_parent(&target, entry_name)?;

        let parent = target
            .parent()
            .unwrap_or(self.destination.as_path())
            .canonicalize()
            .map_err(|e| ExtractionError::io(self.archive, e))?;
        if !path::link_target_inside(&self.destination, &parent, link_target) {
            return Err(ExtractionError::traversal(self.archive, entry_name));
        }

        #[cfg(unix)]
        {
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target).map_err(|e| ExtractionError::io(self.archive, e))?;
            }
            std::os::unix::fs::symlink(link_target, &target)
                .map_err(|e| ExtractionError::io(self.archive, e))?;
        }
        #[cfg(not(unix))]
        {
            tracing::warn!(entry = entry_name, "Symbolic links are not supported here, entry skipped");
        }
        Ok(())
    }

    /// Hard links are materialized as copies of an already extracted entry
    pub(crate) fn hard_link(&mut self, entry_name: &str, link_target: &str) -> Result<()> {
        let Some(target) = self.target(entry_name)? else {
            return Ok(());
        };
        let source = self
            .target(link_target)?
            .ok_or_else(|| ExtractionError::corrupt(self.archive, format!("{entry_name}: empty link target")))?;
        self.prepare_parent(&target, entry_name)?;
        path::ensure_parent_inside(self.archive, &self.destination, &source, link_target)?;

        fs::copy(&source, &target).map_err(|e| ExtractionError::io(self.archive, e))?;
        self.written.push(target);
        Ok(())
    }

    fn prepare_parent(&self, target: &Path, entry_name: &str) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ExtractionError::io(self.archive, e))?;
        }
        path::ensure_parent_inside(self.archive, &self.destination, target, entry_name)
    }
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
    TooLarge(u64),
}

fn copy_limited(
    reader: &mut dyn Read,
    writer: &mut dyn io::Write,
    limit: Option<u64>,
) -> std::result::Result<u64, CopyError> {
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        total += n as u64;
        if let Some(limit) = limit {
            if total > limit {
                return Err(CopyError::TooLarge(limit));
            }
        }
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
    }
}
