use crate::error::{ExtractionError, Result};
use crate::EntryWriter;
use std::io::Read;
use tar::{Archive, EntryType};
use tracing::warn;

/// Reads a plain tar stream, the caller wraps it in a decompressor
pub(crate) fn extract<R: Read>(reader: R, sink: &mut EntryWriter<'_>) -> Result<()> {
    let archive_path = sink.archive().to_path_buf();
    let mut archive = Archive::new(reader);

    let entries = archive
        .entries()
        .map_err(|e| ExtractionError::corrupt(&archive_path, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractionError::corrupt(&archive_path, e))?;
        let name = entry
            .path()
            .map_err(|e| ExtractionError::corrupt(&archive_path, e))?
            .to_string_lossy()
            .into_owned();
        let kind = entry.header().entry_type();

        match kind {
            EntryType::Directory => sink.directory(&name)?,
            EntryType::Regular | EntryType::Continuous => sink.file(&name, &mut entry)?,
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(|e| ExtractionError::corrupt(&archive_path, e))?
                    .ok_or_else(|| {
                        ExtractionError::corrupt(&archive_path, format!("{name}: missing link target"))
                    })?
                    .into_owned();
                sink.symlink(&name, &target)?;
            }
            EntryType::Link => {
                let target = entry
                    .link_name()
                    .map_err(|e| ExtractionError::corrupt(&archive_path, e))?
                    .ok_or_else(|| {
                        ExtractionError::corrupt(&archive_path, format!("{name}: missing link target"))
                    })?
                    .to_string_lossy()
                    .into_owned();
                sink.hard_link(&name, &target)?;
            }
            // Métadonnées pax/GNU déjà consommées par `tar`
            EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink => {}
            other => {
                warn!(entry = %name, kind = ?other, "Skipping unsupported tar entry");
            }
        }
    }

    Ok(())
}
