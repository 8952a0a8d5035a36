// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Acquisition and update pipeline for a desktop client: version negotiation
// with the update server, streaming downloads, archive extraction, write
// preflight of the install directory, install plan generation for the
// external installer and the UI pack cache with its fallback ladder.

pub mod api;
pub mod app_info;
pub mod config;
pub mod error;
pub mod handoff;
pub mod installer;
pub mod settings;
pub mod types;
pub mod uipack;
pub mod version;

mod paths;
#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::TempDir;

pub use api::{ApiConfig, FetchMode, RemoteMetadataClient};
pub use app_info::AppInfo;
pub use config::Config;
pub use error::{Error, Result};
pub use handoff::{HandoffReport, encode_handoff};
pub use installer::{
    HostHooks, InstallStrategy, PreparedUpdate, SystemHost, UpdateSession, UpdateState, platform_strategy,
};
pub use paths::{arch_identifier, platform_identifier};
pub use settings::UpdateSettings;
pub use types::{
    ArtifactStatus, CachedArtifact, InstallPlan, ProgressState, UiPackInfo, UpdateCatalog, UpdateVersion,
};
pub use uipack::{LoadedUiPack, LocalArtifactCache, UiLoadMethod, UiPackRemote};
pub use version::Version;

use paths::TempRegistry;

/// Entry point tying the remote client, local state and installer together.
///
/// Holds the temporary directories it creates until dropped; only the
/// update directory handed to the installer outlives it.
pub struct UpdatePipeline {
    config: Config,
    remote: RemoteMetadataClient,
    app_info: AppInfo,
    settings: Mutex<UpdateSettings>,
    ui_cache: Mutex<LocalArtifactCache>,
    host: Box<dyn HostHooks>,
    update_guard: Mutex<()>,
    temp_dirs: TempRegistry,
}

impl UpdatePipeline {
    /// Creates a pipeline talking to the real desktop session.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_host(config, ApiConfig::new(), Box::new(SystemHost))
    }

    /// Creates a pipeline with explicit timeouts and host integration.
    ///
    /// Fails if a packaged client has no readable `app-info.json`.
    pub fn with_host(config: Config, api_config: ApiConfig, host: Box<dyn HostHooks>) -> Result<Self> {
        let app_info = AppInfo::load(config.resource_path.as_deref())?;
        let remote = RemoteMetadataClient::new(&config.server_url, api_config)?;
        let settings = UpdateSettings::load(config.update_settings_path());
        let ui_cache = LocalArtifactCache::load(config.ui_cache_index());

        log::debug!(target: "install", "client version {}, client channel {}, ui channel {}",
            app_info.client_version(), app_info.client_channel, app_info.ui_pack_channel);

        Ok(Self {
            config,
            remote,
            app_info,
            settings: Mutex::new(settings),
            ui_cache: Mutex::new(ui_cache),
            host,
            update_guard: Mutex::new(()),
            temp_dirs: TempRegistry::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn remote(&self) -> &RemoteMetadataClient {
        &self.remote
    }

    pub fn app_info(&self) -> &AppInfo {
        &self.app_info
    }

    /// The configured override if any, else the version from the app info.
    pub fn current_client_version(&self) -> Version {
        self.config
            .local_version
            .unwrap_or_else(|| self.app_info.client_version())
    }

    /// Channel client updates are looked up on.
    pub fn selected_channel(&self) -> String {
        self.settings.lock().selected_channel().to_string()
    }

    pub fn set_selected_channel(&self, channel: &str) {
        self.settings.lock().set_selected_channel(channel);
    }

    /// Newest update on the channel this client was built for.
    pub fn available_client_update(&self) -> Result<Option<UpdateVersion>> {
        self.available_client_update_on(&self.app_info.client_channel)
    }

    /// Newest update on `channel` that is newer than the running client.
    pub fn available_client_update_on(&self, channel: &str) -> Result<Option<UpdateVersion>> {
        self.remote
            .available_client_update(&self.current_client_version(), channel)
    }

    /// Directory the running client is installed in.
    ///
    /// Only packaged clients have one; two levels above the resource archive.
    pub fn install_root(&self) -> Result<PathBuf> {
        let Some(resource) = self
            .config
            .resource_path
            .as_deref()
            .filter(|path| paths::is_packaged_resource(path))
        else {
            return Err(Error::SourceNotUpdatable);
        };

        let root = resource
            .parent()
            .and_then(Path::parent)
            .ok_or(Error::SourceNotUpdatable)?;
        Ok(std::fs::canonicalize(root)?)
    }

    /// Starts the single update session using the platform's strategy.
    pub fn begin_update(&self) -> Result<UpdateSession<'_>> {
        self.begin_update_with(platform_strategy(self))
    }

    /// Starts the single update session with an explicit strategy.
    pub fn begin_update_with(&self, strategy: Box<dyn InstallStrategy>) -> Result<UpdateSession<'_>> {
        let guard = self.update_guard.try_lock().ok_or(Error::UpdateInProgress)?;
        Ok(UpdateSession::new(self, guard, strategy))
    }

    /// Loads the UI following the configured method or the fallback ladder.
    ///
    /// `on_status` receives a stage description and a progress in `[0, 1]`.
    pub fn load_ui_pack(&self, on_status: &mut dyn FnMut(&str, f64)) -> Result<LoadedUiPack> {
        let channel = self
            .config
            .ui_channel
            .as_deref()
            .unwrap_or(&self.app_info.ui_pack_channel);

        let ctx = uipack::UiLoadContext {
            config: &self.config,
            remote: &self.remote,
            cache: &self.ui_cache,
            temp_dirs: &self.temp_dirs,
            channel,
            client_version: self.current_client_version(),
        };
        uipack::load_ui_pack(&ctx, on_status)
    }

    /// Keeps an unpacked UI tree on disk after the pipeline is dropped.
    ///
    /// Returns the kept directory, or `None` for dev-server UIs.
    pub fn keep_ui_pack(&self, loaded: &LoadedUiPack) -> Option<PathBuf> {
        match loaded {
            LoadedUiPack::Unpacked { root, .. } => self.temp_dirs.release(root),
            LoadedUiPack::DevServer { .. } => None,
        }
    }

    /// Snapshot of the UI pack cache entries.
    pub fn cached_ui_packs(&self) -> Vec<CachedArtifact> {
        self.ui_cache.lock().packs().to_vec()
    }

    pub(crate) fn host(&self) -> &dyn HostHooks {
        self.host.as_ref()
    }

    pub(crate) fn register_temp_dir(&self, dir: TempDir) -> PathBuf {
        self.temp_dirs.register(dir)
    }

    pub(crate) fn release_temp_dir(&self, path: &Path) {
        if self.temp_dirs.release(path).is_none() {
            log::warn!(target: "install", "{} was not a tracked temporary directory", path.display());
        }
    }
}
