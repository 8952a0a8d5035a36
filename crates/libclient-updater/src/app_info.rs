// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, paths, version::Version};

pub(crate) const APP_INFO_VERSION: u32 = 2;
const DEFAULT_CHANNEL: &str = "release";

/// Version triple as stored in `app-info.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientVersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build_index: u32,
    /// Build time in unix milliseconds.
    pub timestamp: u64,
}

/// Build metadata shipped next to the client binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub version: u32,
    pub client_version: ClientVersionInfo,
    pub ui_pack_channel: String,
    pub client_channel: String,
}

impl AppInfo {
    /// The app info substituted when running from source.
    pub fn development() -> Self {
        Self {
            version: APP_INFO_VERSION,
            client_version: ClientVersionInfo {
                major: 0,
                minor: 0,
                patch: 0,
                build_index: 0,
                timestamp: paths::now_millis(),
            },
            ui_pack_channel: DEFAULT_CHANNEL.to_string(),
            client_channel: DEFAULT_CHANNEL.to_string(),
        }
    }

    /// Loads the app info for the client whose packaged resources live at
    /// `resource_path`.
    ///
    /// Unpackaged runs get [`AppInfo::development`]. For a packaged client the
    /// file two levels above the resource must exist and carry version 2.
    pub fn load(resource_path: Option<&Path>) -> Result<Self> {
        let Some(resource_path) = resource_path.filter(|path| paths::is_packaged_resource(path)) else {
            log::debug!(target: "settings", "not running from a packaged resource, using development app info");
            return Ok(Self::development());
        };

        let file = resource_path
            .parent()
            .and_then(Path::parent)
            .map(|root| root.join(paths::APP_INFO_FILE))
            .ok_or_else(|| Error::schema(format!("no install root above {}", resource_path.display())))?;

        Self::read(&file)
    }

    fn read(file: &Path) -> Result<Self> {
        let content = fs::read_to_string(file)
            .map_err(|e| Error::schema(format!("failed to read {}: {e}", file.display())))?;
        let info: AppInfo = serde_json::from_str(&content)
            .map_err(|e| Error::schema(format!("failed to parse {}: {e}", file.display())))?;

        if info.version != APP_INFO_VERSION {
            return Err(Error::schema(format!("invalid app info version {}", info.version)));
        }
        log::debug!(target: "settings", "loaded app info from {}", file.display());
        Ok(info)
    }

    /// The client version this build reports.
    pub fn client_version(&self) -> Version {
        let v = &self.client_version;
        Version::new(v.major, v.minor, v.patch, v.build_index, v.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packaged(dir: &Path, content: &str) -> std::path::PathBuf {
        fs::create_dir_all(dir.join("resources")).unwrap();
        fs::write(dir.join("app-info.json"), content).unwrap();
        dir.join("resources/app.asar")
    }

    #[test]
    fn reads_packaged_app_info() {
        let dir = tempfile::tempdir().unwrap();
        let resource = packaged(
            dir.path(),
            r#"{"version":2,"clientVersion":{"major":1,"minor":5,"patch":2,"buildIndex":4,"timestamp":1600000000000},"uiPackChannel":"beta","clientChannel":"release"}"#,
        );

        let info = AppInfo::load(Some(resource.as_path())).unwrap();

        assert_eq!(info.ui_pack_channel, "beta");
        assert_eq!(info.client_version(), Version::new(1, 5, 2, 4, 1_600_000_000_000));
    }

    #[test]
    fn unpackaged_run_is_development() {
        let info = AppInfo::load(Some(Path::new("/home/dev/client/app"))).unwrap();
        assert!(info.client_version().is_development_version());
        assert_eq!(info.client_channel, "release");
        assert!(info.client_version.timestamp > 0);

        assert!(AppInfo::load(None).unwrap().client_version().is_development_version());
    }

    #[test]
    fn wrong_version_or_missing_file_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let resource = packaged(
            dir.path(),
            r#"{"version":1,"clientVersion":{"major":1,"minor":0,"patch":0,"buildIndex":0,"timestamp":0},"uiPackChannel":"release","clientChannel":"release"}"#,
        );
        assert_eq!(AppInfo::load(Some(resource.as_path())).unwrap_err().code(), "schema-invalid");

        fs::remove_file(dir.path().join("app-info.json")).unwrap();
        assert_eq!(AppInfo::load(Some(resource.as_path())).unwrap_err().code(), "schema-invalid");
    }
}
