// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use rayon::prelude::*;

use crate::{Error, Result};

use super::{extract::is_contained, privilege::check_write_access};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
}

/// Lists which paths of an update archive could not be written under `install_root`.
///
/// Nothing is written. An empty result means every entry is writable.
pub fn check_update_file(update_file: &Path, install_root: &Path) -> Result<Vec<String>> {
    let file = File::open(update_file)
        .map_err(|e| Error::other(format!("failed to read update file {}: {e}", update_file.display())))?;
    check_archive(file, install_root)
}

/// Same as [`check_update_file`] for an already opened tar stream.
///
/// Every entry is evaluated; failures never stop the walk.
pub fn check_archive<R: Read>(archive: R, install_root: &Path) -> Result<Vec<String>> {
    let entries = list_entries(archive)
        .map_err(|e| Error::extraction(format!("failed to list files within tar: {e}")))?;
    log::debug!(target: "preflight", "testing {} entries against {}", entries.len(), install_root.display());

    let errors: Vec<String> = entries
        .par_iter()
        .filter_map(|(relative, kind)| test_entry(&install_root.join(relative), *kind))
        .collect();

    if errors.is_empty() {
        log::info!(target: "preflight", "all target paths are writable");
    } else {
        for error in &errors {
            log::warn!(target: "preflight", "{error}");
        }
    }
    Ok(errors)
}

fn list_entries<R: Read>(reader: R) -> std::io::Result<Vec<(PathBuf, EntryKind)>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let entry = entry?;
        let kind = match entry.header().entry_type() {
            t if t.is_file() => EntryKind::File,
            t if t.is_dir() => EntryKind::Directory,
            _ => continue,
        };

        let relative = entry.path()?.into_owned();
        if !is_contained(&relative) {
            log::debug!(target: "preflight", "ignoring entry outside of root: {}", relative.display());
            continue;
        }
        entries.push((relative, kind));
    }

    Ok(entries)
}

fn test_entry(target: &Path, kind: EntryKind) -> Option<String> {
    if kind == EntryKind::File && target.exists() {
        return check_write_access(target).err().map(|code| {
            format!("failed to acquire write permissions for file {} ({code})", target.display())
        });
    }

    let ancestor = existing_ancestor(target);
    check_write_access(&ancestor).err().map(|code| {
        format!(
            "failed to acquire write permissions for directory {} ({code}, target directory {})",
            target.display(),
            ancestor.display()
        )
    })
}

/// Walks up from the parent of `path` to the first directory that exists.
fn existing_ancestor(path: &Path) -> PathBuf {
    let mut directory = path.parent();
    while let Some(dir) = directory {
        if dir.exists() {
            return dir.to_path_buf();
        }
        directory = dir.parent();
    }
    path.to_path_buf()
}
