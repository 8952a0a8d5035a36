// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::output::Verbosity;

const CONFIG_FILE_NAME: &str = "client-updater.toml";

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TomlConfig {
    server_url: Option<String>,
    channel: Option<String>,
    data_dir: Option<PathBuf>,
    resource_path: Option<PathBuf>,
    executable_path: Option<PathBuf>,
    process_name: Option<String>,
    assume_yes: bool,
    verbosity: Option<String>,
}

/// Values from the config file, overridden by command line flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub server_url: Option<String>,
    pub channel: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub resource_path: Option<PathBuf>,
    /// The client executable being updated; defaults to this binary.
    pub executable_path: Option<PathBuf>,
    /// Process name terminated before installing.
    pub process_name: Option<String>,
    pub assume_yes: bool,
    pub verbosity: Verbosity,
}

impl CliConfig {
    /// Loads the config file from the user's config directory, if any.
    pub fn load() -> libclient_updater::Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> libclient_updater::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            libclient_updater::Error::other(format!("failed to read config file {}: {e}", path.display()))
        })?;

        let toml_config: TomlConfig = toml::from_str(&content).map_err(|e| {
            libclient_updater::Error::other(format!("failed to parse config file {}: {e}", path.display()))
        })?;

        Ok(Self {
            server_url: toml_config.server_url,
            channel: toml_config.channel,
            data_dir: toml_config.data_dir,
            resource_path: toml_config.resource_path,
            executable_path: toml_config.executable_path,
            process_name: toml_config.process_name,
            assume_yes: toml_config.assume_yes,
            verbosity: parse_verbosity(toml_config.verbosity.as_deref()),
        })
    }

    /// Builds the library config, preferring explicit `overrides`.
    pub fn to_library_config(&self, overrides: &Overrides) -> libclient_updater::Config {
        let mut config = libclient_updater::Config::new();

        if let Some(url) = overrides.server_url.as_ref().or(self.server_url.as_ref()) {
            config = config.with_server_url(url);
        }
        if let Some(dir) = overrides.data_dir.as_ref().or(self.data_dir.as_ref()) {
            config = config.with_data_dir(dir);
        }
        if let Some(path) = overrides.resource_path.as_ref().or(self.resource_path.as_ref()) {
            config = config.with_resource_path(path);
        }
        if let Some(path) = overrides.executable_path.as_ref().or(self.executable_path.as_ref()) {
            config = config.with_executable_path(path);
        }
        if let Some(name) = overrides.process_name.as_ref().or(self.process_name.as_ref()) {
            config = config.with_process_name(name);
        }
        if let Some(version) = overrides.local_version.as_deref() {
            config = config.with_local_version(libclient_updater::Version::parse(version));
        }

        config.with_debug(overrides.debug)
    }
}

/// Command line values taking precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub resource_path: Option<PathBuf>,
    pub executable_path: Option<PathBuf>,
    pub process_name: Option<String>,
    pub local_version: Option<String>,
    pub debug: bool,
}

fn parse_verbosity(verbosity: Option<&str>) -> Verbosity {
    match verbosity {
        Some("quiet") => Verbosity::Quiet,
        Some("verbose") => Verbosity::Verbose,
        _ => Verbosity::Normal,
    }
}
