// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fs::{self, File},
    io::Read,
    path::{Component, Path, PathBuf},
};

use crate::{Error, Result};

/// File stem of the external installer shipped inside update packages.
pub(crate) const INSTALLER_STEM: &str = "update-installer";

/// Installer file names, never moved over by the plan.
pub(crate) const INSTALLER_FILE_NAMES: [&str; 2] = ["update-installer.exe", "update-installer"];

/// Result of unpacking a client update.
#[derive(Debug)]
pub(crate) struct ExtractedUpdate {
    pub installer: PathBuf,
    pub entries: usize,
}

/// Unpacks a client update tar into `dest`.
///
/// Individual entries that cannot be written are logged and skipped. A
/// broken archive or a package without the installer fails.
pub(crate) fn extract_update(archive: &Path, dest: &Path) -> Result<ExtractedUpdate> {
    fs::create_dir_all(dest)
        .map_err(|e| Error::extraction(format!("failed to create update source directory: {e}")))?;

    let file = File::open(archive).map_err(|e| Error::extraction(format!("failed to open update file: {e}")))?;
    log::info!(target: "extract", "extracting {} to {}", archive.display(), dest.display());

    let mut installer = None;
    let mut entries = 0;
    unpack_entries(file, dest, |relative, result| {
        entries += 1;
        match result {
            Ok(()) => {
                if relative.file_stem().is_some_and(|stem| stem == INSTALLER_STEM) {
                    let path = dest.join(relative);
                    log::info!(target: "extract", "found update installer at {}", path.display());
                    installer = Some(path);
                }
            }
            Err(e) => log::warn!(target: "extract", "ignoring {} due to an error: {e}", relative.display()),
        }
        Ok(())
    })
    .map_err(|e| Error::extraction(format!("update unpacking failed: {e}")))?;

    match installer {
        Some(installer) if installer.is_file() => Ok(ExtractedUpdate { installer, entries }),
        _ => Err(Error::MissingInstallerExecutable),
    }
}

/// Unpacks a tar stream into `dest`, handing every entry's outcome to `on_entry`.
///
/// Entries whose path escapes `dest` are skipped. `on_entry` decides whether
/// a per-entry failure aborts the walk.
pub(crate) fn unpack_entries<R, F>(reader: R, dest: &Path, mut on_entry: F) -> std::io::Result<()>
where
    R: Read,
    F: FnMut(&Path, std::io::Result<()>) -> std::io::Result<()>,
{
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();
        if !is_contained(&relative) {
            log::debug!(target: "extract", "skipping entry outside of root: {}", relative.display());
            continue;
        }

        let result = entry.unpack_in(dest).map(|_| ());
        if !entry.header().entry_type().is_file() && result.is_ok() {
            continue;
        }
        on_entry(&relative, result)?;
    }

    Ok(())
}

/// Returns true if joining `relative` onto a root stays inside it.
pub(crate) fn is_contained(relative: &Path) -> bool {
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tar_archive;

    fn write_archive(dir: &Path, files: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("update.tar");
        fs::write(&path, tar_archive(files)).unwrap();
        path
    }

    #[test]
    fn extracts_and_finds_installer() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(
            dir.path(),
            &[
                ("TeaClient", b"binary"),
                ("resources/app.asar", b"asar"),
                ("update-installer", b"installer"),
            ],
        );
        let dest = dir.path().join("out");

        let extracted = extract_update(&archive, &dest).unwrap();

        assert_eq!(extracted.installer, dest.join("update-installer"));
        assert_eq!(extracted.entries, 3);
        assert_eq!(fs::read(dest.join("resources/app.asar")).unwrap(), b"asar");
    }

    #[test]
    fn windows_installer_name_is_recognised() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path(), &[("bin/update-installer.exe", b"installer")]);
        let extracted = extract_update(&archive, &dir.path().join("out")).unwrap();
        assert!(extracted.installer.ends_with("bin/update-installer.exe"));
    }

    #[test]
    fn missing_installer_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path(), &[("TeaClient", b"binary")]);
        let err = extract_update(&archive, &dir.path().join("out")).unwrap_err();
        assert_eq!(err.code(), "missing-installer-executable");
        assert!(err.is_fatal());
    }

    #[test]
    fn broken_archive_fails_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("update.tar");
        fs::write(&archive, vec![0x42; 1024]).unwrap();
        let err = extract_update(&archive, &dir.path().join("out")).unwrap_err();
        assert_eq!(err.code(), "extract-failed");
    }

    #[test]
    fn containment() {
        assert!(is_contained(Path::new("a/b/c")));
        assert!(is_contained(Path::new("./a")));
        assert!(!is_contained(Path::new("../a")));
        assert!(!is_contained(Path::new("/etc/passwd")));
    }
}
