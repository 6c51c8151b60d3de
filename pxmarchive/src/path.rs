//! Entry path validation

use crate::error::{ExtractionError, Result};
use std::path::{Component, Path, PathBuf};

/// Computes the on-disk path of an archive entry
///
/// Returns `Ok(None)` for entries that resolve to the destination itself
/// (`./`, empty names). Absolute paths, drive prefixes and any `..`
/// component are rejected outright, even when the result would land back
/// inside the destination.
pub(crate) fn entry_destination(
    archive: &Path,
    destination: &Path,
    entry_name: &str,
) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();

    for component in Path::new(entry_name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractionError::traversal(archive, entry_name));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(destination.join(relative)))
    }
}

/// Checks that a link created in `link_parent` and pointing to `target`
/// resolves inside `destination`
///
/// Both directories must be canonical. The target is walked from the
/// link's real parent, following links already extracted on the way; a
/// `..` after a component that does not exist yet is refused, since a later
/// entry could turn that component into a link.
pub(crate) fn link_target_inside(destination: &Path, link_parent: &Path, target: &Path) -> bool {
    if target.is_absolute() || !link_parent.starts_with(destination) {
        return false;
    }

    let mut current = link_parent.to_path_buf();
    let mut resolved = true;

    for component in target.components() {
        match component {
            Component::Normal(part) => {
                current.push(part);
                match current.canonicalize() {
                    Ok(real) => current = real,
                    Err(_) => resolved = false,
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved || current == destination {
                    return false;
                }
                current.pop();
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
        if !current.starts_with(destination) {
            return false;
        }
    }

    true
}

/// Verifies that the already-created parent of `path` has not been
/// redirected outside `destination` through a symlink
pub(crate) fn ensure_parent_inside(
    archive: &Path,
    canonical_destination: &Path,
    path: &Path,
    entry_name: &str,
) -> Result<()> {
    match path.parent() {
        Some(parent) => ensure_inside(archive, canonical_destination, parent, entry_name),
        None => Ok(()),
    }
}

/// Verifies that an existing directory resolves inside `destination`
pub(crate) fn ensure_inside(
    archive: &Path,
    canonical_destination: &Path,
    path: &Path,
    entry_name: &str,
) -> Result<()> {
    let canonical = path
        .canonicalize()
        .map_err(|e| ExtractionError::io(archive, e))?;
    if canonical.starts_with(canonical_destination) {
        Ok(())
    } else {
        Err(ExtractionError::traversal(archive, entry_name))
    }
}
