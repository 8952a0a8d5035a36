// SPDX-License-Identifier: MIT OR Apache-2.0

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::version::Version;

/// Extension of the packaged application resource archive.
pub(crate) const PACKAGED_RESOURCE_EXTENSION: &str = "asar";

pub(crate) const APP_INFO_FILE: &str = "app-info.json";
pub(crate) const BUNDLED_UI_MANIFEST: &str = "bundled-ui.json";
pub(crate) const UPDATE_SETTINGS_FILE: &str = "update-settings.json";
pub(crate) const UI_CACHE_DIR: &str = "ui-cache";
pub(crate) const UI_CACHE_INDEX: &str = "cache.json";
pub(crate) const APP_VERSIONS_DIR: &str = "app_versions";

/// Returns the per-user data directory, respecting XDG_DATA_HOME.
pub(crate) fn data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| user_home().join(".local/share"))
}

fn user_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default())
}

/// Returns true if `resource_path` points into a packaged install.
pub(crate) fn is_packaged_resource(resource_path: &Path) -> bool {
    resource_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGED_RESOURCE_EXTENSION))
}

/// Local file name of a downloaded client update.
pub(crate) fn update_file_name(channel: &str, version: &Version) -> String {
    format!(
        "{channel}_{}_{}_{}_{}.tar",
        version.major, version.minor, version.patch, version.build
    )
}

/// Local file name of a downloaded UI pack.
pub(crate) fn ui_pack_file_name(channel: &str, versions_hash: &str, timestamp_millis: u64) -> String {
    let hash: String = versions_hash
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{channel}_{hash}_{timestamp_millis}.tar.gz")
}

/// Platform name as reported by the update server.
pub fn platform_identifier() -> &'static str {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        other => other,
    }
}

/// CPU architecture name as reported by the update server.
pub fn arch_identifier() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Milliseconds since the unix epoch.
pub(crate) fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Renames a file aside as `<name>.<millis>` so it can be inspected later.
pub(crate) fn rename_aside(path: &Path) {
    let mut target = path.as_os_str().to_os_string();
    target.push(format!(".{}", now_millis()));
    match std::fs::rename(path, &target) {
        Ok(()) => log::warn!(target: "cache", "moved {} aside to {}", path.display(), PathBuf::from(&target).display()),
        Err(e) => log::error!(target: "cache", "failed to move {} aside: {e}", path.display()),
    }
}

/// Temporary directories removed when the owning pipeline is dropped.
#[derive(Debug, Default)]
pub(crate) struct TempRegistry {
    dirs: Mutex<Vec<TempDir>>,
}

impl TempRegistry {
    /// Takes ownership of `dir` until exit and returns its path.
    pub fn register(&self, dir: TempDir) -> PathBuf {
        let path = dir.path().to_path_buf();
        self.dirs.lock().push(dir);
        path
    }

    /// Stops tracking `path` so it survives this process.
    pub fn release(&self, path: &Path) -> Option<PathBuf> {
        let mut dirs = self.dirs.lock();
        let index = dirs.iter().position(|dir| dir.path() == path)?;
        Some(dirs.swap_remove(index).keep())
    }
}
