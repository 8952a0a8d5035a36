// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{ffi::OsStr, path::Path};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};

use crate::{Error, Result};

/// Tests write access without writing anything.
///
/// Returns a short reason code on denial.
#[cfg(unix)]
pub(crate) fn check_write_access(path: &Path) -> std::result::Result<(), String> {
    use nix::unistd::{AccessFlags, access};

    access(path, AccessFlags::W_OK).map_err(|errno| format!("{errno:?}"))
}

#[cfg(not(unix))]
pub(crate) fn check_write_access(path: &Path) -> std::result::Result<(), String> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.permissions().readonly() => Err("EACCES".to_string()),
        Ok(_) => Ok(()),
        Err(e) => Err(e.kind().to_string()),
    }
}

/// The command an operator runs to install by hand.
pub(crate) fn sudo_command_line(installer: &Path, log_file: &Path, plan_file: &Path) -> String {
    format!(
        "sudo \"{}\" \"{}\" \"{}\" no-daemon",
        installer.display(),
        log_file.display(),
        plan_file.display()
    )
}

/// Marks the installer as executable (`0o755`).
#[cfg(unix)]
pub(crate) fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::installer(format!("failed to make update installer executable: {e}")))
}

#[cfg(not(unix))]
pub(crate) fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Force-kills every process named `name` except the current one.
///
/// Helper processes of the application must not hold file handles while the
/// installer moves files. Returns the number of processes signalled.
pub(crate) fn kill_processes_named(name: &str) -> usize {
    let own_pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

    let mut killed = 0;
    for (pid, process) in system.processes() {
        if *pid == own_pid || process.name() != OsStr::new(name) {
            continue;
        }

        match process.kill_with(Signal::Kill) {
            Some(true) => {
                log::debug!(target: "install", "killed {name} ({pid})");
                killed += 1;
            }
            _ => log::warn!(target: "install", "failed to kill {name} ({pid})"),
        }
    }
    killed
}
