//! Editing the user files of a task or algorithm.
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{HasConfig, HasImpression};
use crate::fsutil::{self, normalize_within, CHERN_DIR, SETTINGS_FILE};
use crate::Error;

/// Resolves `name` inside the node, refusing its metadata.
fn user_path(node: &dyn HasImpression, name: &str) -> Result<PathBuf, Error> {
    let path = normalize_within(node.path(), name)?;
    let relative = path
        .strip_prefix(node.path())
        .expect("Chern bug: normalized path left its base");
    let mut components = relative.components();
    match components.next() {
        None => Err(Error::InvalidTarget(format!(
            "{} refers to the node itself",
            name
        ))),
        Some(first) if first.as_os_str() == CHERN_DIR => Err(Error::InvalidTarget(format!(
            "{} is chern metadata",
            name
        ))),
        Some(first) if first.as_os_str() == SETTINGS_FILE && components.next().is_none() => {
            Err(Error::InvalidTarget(format!("{} is chern metadata", name)))
        }
        Some(_) => Ok(path),
    }
}

/// Copies the file or directory at `source` into the node, keeping its name.
pub fn import_file(node: &dyn HasImpression, source: &Path) -> Result<PathBuf, Error> {
    let name = source
        .file_name()
        .ok_or_else(|| Error::InvalidTarget(format!("{} has no file name", source.display())))?;
    let target = user_path(node, &name.to_string_lossy())?;
    if target.exists() {
        return Err(Error::ConstraintViolation(format!(
            "{} already exists in {}",
            name.to_string_lossy(),
            node.handle()
        )));
    }

    let metadata = std::fs::metadata(source).map_err(Error::io(source))?;
    if metadata.is_dir() {
        fsutil::copy_tree(source, &target)?;
    } else {
        std::fs::copy(source, &target).map_err(Error::io(&target))?;
    }
    debug!(source = %source.display(), node = %node.handle(), "imported file");
    Ok(target)
}

/// Removes a file or directory of the node.
pub fn rm_file(node: &dyn HasImpression, name: &str) -> Result<(), Error> {
    let target = user_path(node, name)?;
    let metadata = std::fs::symlink_metadata(&target).map_err(|_| {
        Error::InvalidTarget(format!("{} does not exist in {}", name, node.handle()))
    })?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(&target).map_err(Error::io(&target))
    } else {
        std::fs::remove_file(&target).map_err(Error::io(&target))
    }
}

/// Renames a file or directory within the node, creating missing parent directories.
pub fn move_file(node: &dyn HasImpression, from: &str, to: &str) -> Result<(), Error> {
    let source = user_path(node, from)?;
    let target = user_path(node, to)?;
    if !source.exists() {
        return Err(Error::InvalidTarget(format!(
            "{} does not exist in {}",
            from,
            node.handle()
        )));
    }
    if target.exists() {
        return Err(Error::ConstraintViolation(format!(
            "{} already exists in {}",
            to,
            node.handle()
        )));
    }
    if target.starts_with(&source) {
        return Err(Error::ConstraintViolation(format!(
            "cannot move {} into itself",
            from
        )));
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(Error::io(parent))?;
    }
    std::fs::rename(&source, &target).map_err(Error::io(&source))
}
