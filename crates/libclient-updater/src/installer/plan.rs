// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    Error, Result,
    api::INSTALL_LOCK_TIMEOUT_MILLIS,
    types::{InstallPlan, LockFile, MoveFile},
};

use super::extract::INSTALLER_FILE_NAMES;

pub(crate) const PLAN_VERSION: u32 = 1;
pub(crate) const CALLBACK_SUCCESS_FLAG: &str = "--update-succeed-new";
pub(crate) const CALLBACK_FAILURE_FLAG: &str = "--update-failed-new";
pub(crate) const CALLBACK_ARGS_SUCCESS: &str = "--no-single-instance --update-succeed-new=";
pub(crate) const CALLBACK_ARGS_FAILURE: &str = "--no-single-instance --update-failed-new=";
const MAIN_EXE_LOCK_ID: &str = "main-exe-lock";

/// Builds the installer plan moving every file of `source` onto `target`.
///
/// Directories are walked in name order so identical inputs produce identical
/// plans. Empty directories produce nothing.
pub fn build_install_plan(source: &Path, target: &Path, executable: &Path) -> Result<InstallPlan> {
    log::debug!(target: "plan", "building install plan from {} onto {}", source.display(), target.display());

    let mut moves = Vec::new();
    walk(source, target, &mut moves)?;
    log::info!(target: "plan", "install plan moves {} files", moves.len());

    Ok(InstallPlan {
        version: PLAN_VERSION,
        backup_enabled: true,
        backup_directory: backup_directory(source),
        permission_test_directory: target.to_path_buf(),
        callback_executable: executable.to_path_buf(),
        callback_args_success: CALLBACK_ARGS_SUCCESS.to_string(),
        callback_args_failure: CALLBACK_ARGS_FAILURE.to_string(),
        moves,
        locks: vec![LockFile {
            filename: executable.to_path_buf(),
            timeout_millis: INSTALL_LOCK_TIMEOUT_MILLIS,
            error_id: MAIN_EXE_LOCK_ID.to_string(),
        }],
    })
}

/// Writes the plan as JSON.
pub fn write_install_plan(plan: &InstallPlan, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(plan)?;
    fs::write(path, json)
        .map_err(|e| Error::disk_write(format!("failed to write install plan {}: {e}", path.display())))?;
    log::debug!(target: "plan", "wrote install plan to {}", path.display());
    Ok(())
}

/// `<parent>/<name>_backup` beside the source directory.
fn backup_directory(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    source.with_file_name(format!("{name}_backup"))
}

fn walk(source_dir: &Path, target_dir: &Path, moves: &mut Vec<MoveFile>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(source_dir)
        .map_err(|e| Error::plan(format!("failed to read {}: {e}", source_dir.display())))?
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name();
        if INSTALLER_FILE_NAMES.iter().any(|ignored| name == *ignored) {
            log::debug!(target: "plan", "ignoring {}", entry.path().display());
            continue;
        }

        let source = entry.path();
        let target = target_dir.join(&name);
        let metadata = fs::metadata(&source)
            .map_err(|e| Error::plan(format!("failed to stat {}: {e}", source.display())))?;

        if metadata.is_dir() {
            walk(&source, &target, moves)?;
        } else {
            moves.push(MoveFile {
                source_path: source,
                target_path: target,
                error_id: format!("move-file-{}", moves.len()),
            });
        }
    }

    Ok(())
}
