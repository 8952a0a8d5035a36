// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, paths};

pub(crate) const SETTINGS_VERSION: u32 = 1;
pub const DEFAULT_CHANNEL: &str = "release";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    version: u32,
    selected_channel: String,
}

/// Persisted updater preferences.
#[derive(Debug)]
pub struct UpdateSettings {
    path: PathBuf,
    selected_channel: String,
}

impl UpdateSettings {
    /// Loads the settings at `path`, falling back to defaults.
    ///
    /// A corrupt or outdated file is renamed aside first.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let selected_channel = match read_settings(&path) {
            Ok(Some(file)) => file.selected_channel,
            Ok(None) => DEFAULT_CHANNEL.to_string(),
            Err(e) => {
                log::warn!(target: "settings", "failed to parse update settings {}: {e}", path.display());
                paths::rename_aside(&path);
                DEFAULT_CHANNEL.to_string()
            }
        };

        Self { path, selected_channel }
    }

    /// The channel client updates are fetched from.
    ///
    /// May differ from the channel the running client was built for.
    pub fn selected_channel(&self) -> &str {
        &self.selected_channel
    }

    /// Switches the update channel and persists the change.
    pub fn set_selected_channel(&mut self, channel: &str) {
        if self.selected_channel == channel {
            return;
        }

        log::info!(target: "settings", "update channel changed from {} to {channel}", self.selected_channel);
        self.selected_channel = channel.to_string();
        self.save();
    }

    /// Writes the settings. Failures are logged only.
    pub fn save(&self) {
        if let Err(e) = self.write() {
            log::error!(target: "settings", "failed to save update settings {}: {e}", self.path.display());
        }
    }

    fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = SettingsFile {
            version: SETTINGS_VERSION,
            selected_channel: self.selected_channel.clone(),
        };
        fs::write(&self.path, serde_json::to_string(&file)?).map_err(|e| Error::disk_write(e.to_string()))
    }
}

fn read_settings(path: &Path) -> Result<Option<SettingsFile>> {
    if !path.exists() {
        return Ok(None);
    }

    let file: SettingsFile = serde_json::from_str(&fs::read_to_string(path)?)?;
    if file.version != SETTINGS_VERSION {
        return Err(Error::schema(format!("invalid update settings version {}", file.version)));
    }
    Ok(Some(file))
}
