// SPDX-License-Identifier: MIT OR Apache-2.0

use std::path::PathBuf;

use crate::{paths, uipack::UiLoadMethod, version::Version};

pub const DEFAULT_SERVER_URL: &str = "https://clientapi.teaspeak.de/";
pub const DEFAULT_APP_NAME: &str = "client-updater";

/// Configuration for an update pipeline.
///
/// Library consumers construct this directly; there is no file parsing here.
///
/// # Examples
///
/// ```rust
/// use libclient_updater::Config;
///
/// let config = Config::new()
///     .with_server_url("https://updates.example.com/")
///     .with_resource_path("/opt/client/resources/app.asar");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the update server; `api.php` is resolved against it.
    pub server_url: String,

    /// Used to derive the default data directory.
    pub app_name: String,

    /// Where downloads, the UI cache and settings live.
    /// `None` uses `<data home>/<app_name>`.
    pub data_dir: Option<PathBuf>,

    /// Parent of temporary extraction directories. `None` uses the OS temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Path of the packaged resource archive (`<root>/resources/app.asar`).
    ///
    /// `None` or a path that is not a packaged archive marks a from-source run,
    /// which cannot be updated.
    pub resource_path: Option<PathBuf>,

    /// The running executable. `None` uses [`std::env::current_exe`].
    pub executable_path: Option<PathBuf>,

    /// Process name killed before installing on Linux. `None` uses the
    /// executable's file name.
    pub process_name: Option<String>,

    /// Pretend to be this client version.
    pub local_version: Option<Version>,

    /// Overrides the UI pack channel from the app info.
    pub ui_channel: Option<String>,

    /// Forces one UI loading method instead of the fallback ladder.
    pub ui_load_method: Option<UiLoadMethod>,

    /// Ignore the local UI pack cache.
    pub ui_no_cache: bool,

    /// Accept remote UI packs regardless of their required client version.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            data_dir: None,
            temp_dir: None,
            resource_path: None,
            executable_path: None,
            process_name: None,
            local_version: None,
            ui_channel: None,
            ui_load_method: None,
            ui_no_cache: false,
            debug: false,
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_resource_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.resource_path = Some(path.into());
        self
    }

    pub fn with_executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }

    pub fn with_local_version(mut self, version: Version) -> Self {
        self.local_version = Some(version);
        self
    }

    pub fn with_ui_channel(mut self, channel: impl Into<String>) -> Self {
        self.ui_channel = Some(channel.into());
        self
    }

    pub fn with_ui_load_method(mut self, method: UiLoadMethod) -> Self {
        self.ui_load_method = Some(method);
        self
    }

    pub fn with_ui_no_cache(mut self, no_cache: bool) -> Self {
        self.ui_no_cache = no_cache;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| paths::data_home().join(&self.app_name))
    }

    /// Resolved parent directory for temporary extraction.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub(crate) fn ui_cache_dir(&self) -> PathBuf {
        self.data_dir().join(paths::UI_CACHE_DIR)
    }

    pub(crate) fn ui_cache_index(&self) -> PathBuf {
        self.ui_cache_dir().join(paths::UI_CACHE_INDEX)
    }

    pub(crate) fn app_versions_dir(&self) -> PathBuf {
        self.data_dir().join(paths::APP_VERSIONS_DIR)
    }

    pub(crate) fn update_settings_path(&self) -> PathBuf {
        self.data_dir().join(paths::UPDATE_SETTINGS_FILE)
    }

    /// The running executable, used as plan callback and lock target.
    pub fn executable_path(&self) -> PathBuf {
        self.executable_path
            .clone()
            .or_else(|| std::env::current_exe().ok())
            .unwrap_or_default()
    }

    /// Name matched against running processes before an install.
    pub fn process_name(&self) -> String {
        self.process_name.clone().unwrap_or_else(|| {
            self.executable_path()
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| self.app_name.clone())
        })
    }

    /// Returns the server URL with a guaranteed trailing slash.
    pub(crate) fn server_base(&self) -> String {
        if self.server_url.ends_with('/') {
            self.server_url.clone()
        } else {
            format!("{}/", self.server_url)
        }
    }
}
