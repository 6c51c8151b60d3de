use crate::error::{ExtractionError, Result};
use crate::EntryWriter;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use zip::result::ZipError;
use zip::ZipArchive;

pub(crate) fn extract(file: File, sink: &mut EntryWriter<'_>) -> Result<()> {
    let archive_path = sink.archive().to_path_buf();
    let mut archive =
        ZipArchive::new(file).map_err(|e| map_zip_error(&archive_path, e))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| map_zip_error(&archive_path, e))?;
        let name = entry.name().to_string();

        if entry.is_dir() {
            sink.directory(&name)?;
        } else if entry.is_symlink() {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| ExtractionError::corrupt(&archive_path, format!("{name}: {e}")))?;
            sink.symlink(&name, &PathBuf::from(target))?;
        } else {
            sink.file(&name, &mut entry)?;
        }
    }

    Ok(())
}

fn map_zip_error(archive: &std::path::Path, error: ZipError) -> ExtractionError {
    match error {
        ZipError::Io(e) => ExtractionError::io(archive, e),
        ZipError::UnsupportedArchive(reason) => ExtractionError::unsupported(archive, reason),
        other => ExtractionError::corrupt(archive, other),
    }
}
