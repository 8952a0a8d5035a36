// SPDX-License-Identifier: MIT OR Apache-2.0

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// One row of the remote client-update catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateVersion {
    pub channel: String,
    pub platform: String,
    pub arch: String,
    pub version: Version,
}

/// The parsed remote client-update catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateCatalog {
    pub client_versions: Vec<UpdateVersion>,
    /// Version of the external installer, published on the `updater` channel.
    pub updater_version: Option<UpdateVersion>,
}

impl UpdateCatalog {
    /// Picks the newest build for an exact channel/platform/arch match.
    pub fn newest_version_for(&self, channel: &str, platform: &str, arch: &str) -> Option<&UpdateVersion> {
        self.client_versions
            .iter()
            .filter(|v| v.channel == channel && v.platform == platform && v.arch == arch)
            .fold(None, |newest: Option<&UpdateVersion>, candidate| match newest {
                Some(current) if !candidate.version.newer_than(&current.version, false) => Some(current),
                _ => Some(candidate),
            })
    }

    /// Distinct channels in catalog order.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();
        for version in &self.client_versions {
            if !channels.contains(&version.channel) {
                channels.push(version.channel.clone());
            }
        }
        channels
    }
}

/// Metadata describing one UI pack build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPackInfo {
    #[serde(rename = "timestamp")]
    pub timestamp_millis: u64,
    /// Informational only; `versions_hash` is the identity.
    #[serde(rename = "version")]
    pub version_string: String,
    pub versions_hash: String,
    pub channel: String,
    pub required_client_version: String,
}

/// Validity of a cached artifact. Invalid entries stay in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactStatus {
    Valid,
    Invalid { reason: String, timestamp: u64 },
}

impl ArtifactStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// A UI pack stored on disk, as recorded in the local cache index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedArtifact {
    pub download_timestamp: u64,
    #[serde(with = "pathbuf_serde")]
    pub local_file_path: PathBuf,
    #[serde(rename = "localChecksum", default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub pack_info: UiPackInfo,
    pub status: ArtifactStatus,
}

impl CachedArtifact {
    /// Two records describe the same file download.
    pub fn same_artifact(&self, other: &CachedArtifact) -> bool {
        self.local_file_path == other.local_file_path
            && self.download_timestamp == other.download_timestamp
            && self.pack_info.versions_hash == other.pack_info.versions_hash
    }
}

/// Transfer progress pushed to a caller-supplied sink.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressState {
    /// Between 0 and 1.
    pub percent: f64,
    pub speed_bytes_per_sec: f64,
    pub size_total: u64,
    pub size_transferred: u64,
    pub elapsed_secs: f64,
    pub remaining_secs: f64,
}

impl ProgressState {
    /// The synthetic event emitted when the transport stream ends.
    pub fn finished() -> Self {
        Self {
            percent: 1.0,
            ..Self::default()
        }
    }
}

/// A declarative plan consumed by the external installer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallPlan {
    pub version: u32,
    #[serde(rename = "backup")]
    pub backup_enabled: bool,
    #[serde(rename = "backup-directory", with = "pathbuf_serde")]
    pub backup_directory: PathBuf,
    #[serde(rename = "permission-test-directory", with = "pathbuf_serde")]
    pub permission_test_directory: PathBuf,
    #[serde(rename = "callback_file", with = "pathbuf_serde")]
    pub callback_executable: PathBuf,
    #[serde(rename = "callback_argument_success")]
    pub callback_args_success: String,
    #[serde(rename = "callback_argument_fail")]
    pub callback_args_failure: String,
    pub moves: Vec<MoveFile>,
    pub locks: Vec<LockFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFile {
    #[serde(rename = "source", with = "pathbuf_serde")]
    pub source_path: PathBuf,
    #[serde(rename = "target", with = "pathbuf_serde")]
    pub target_path: PathBuf,
    #[serde(rename = "error-id")]
    pub error_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    #[serde(with = "pathbuf_serde")]
    pub filename: PathBuf,
    #[serde(rename = "timeout")]
    pub timeout_millis: u64,
    #[serde(rename = "error-id")]
    pub error_id: String,
}

mod pathbuf_serde {
    use std::path::{Path, PathBuf};

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&path.to_string_lossy())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(PathBuf::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(channel: &str, platform: &str, arch: &str, version: &str) -> UpdateVersion {
        UpdateVersion {
            channel: channel.to_string(),
            platform: platform.to_string(),
            arch: arch.to_string(),
            version: Version::parse(version),
        }
    }

    #[test]
    fn newest_version_requires_exact_match() {
        let catalog = UpdateCatalog {
            client_versions: vec![
                row("release", "linux", "x64", "1.4.0"),
                row("release", "linux", "x64", "1.5.2"),
                row("release", "linux", "arm64", "9.0.0"),
                row("beta", "linux", "x64", "2.0.0"),
                row("release", "win32", "x64", "3.0.0"),
                row("release", "linux", "x64", "1.5.1-9"),
            ],
            updater_version: None,
        };

        let newest = catalog.newest_version_for("release", "linux", "x64").unwrap();
        assert_eq!(newest.version.to_string(), "1.5.2");
        assert!(catalog.newest_version_for("nightly", "linux", "x64").is_none());
        assert_eq!(catalog.channels(), vec!["release", "beta"]);
    }

    #[test]
    fn cached_artifact_json_shape() {
        let artifact = CachedArtifact {
            download_timestamp: 5,
            local_file_path: PathBuf::from("/cache/pack.tar.gz"),
            checksum: Some("abc".to_string()),
            pack_info: UiPackInfo {
                timestamp_millis: 1000,
                version_string: "1.0".to_string(),
                versions_hash: "deadbeef".to_string(),
                channel: "release".to_string(),
                required_client_version: "1.4.0".to_string(),
            },
            status: ArtifactStatus::Invalid {
                reason: "failed to unpack".to_string(),
                timestamp: 9,
            },
        };

        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["localFilePath"], "/cache/pack.tar.gz");
        assert_eq!(json["localChecksum"], "abc");
        assert_eq!(json["packInfo"]["versionsHash"], "deadbeef");
        assert_eq!(json["status"]["type"], "invalid");

        let back: CachedArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn install_plan_uses_installer_field_names() {
        let plan = InstallPlan {
            version: 1,
            backup_enabled: true,
            backup_directory: PathBuf::from("/tmp/x_backup"),
            permission_test_directory: PathBuf::from("/opt/app"),
            callback_executable: PathBuf::from("/opt/app/client"),
            callback_args_success: "--ok=".to_string(),
            callback_args_failure: "--fail=".to_string(),
            moves: vec![MoveFile {
                source_path: PathBuf::from("/tmp/x/a"),
                target_path: PathBuf::from("/opt/app/a"),
                error_id: "move-file-0".to_string(),
            }],
            locks: vec![],
        };

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["backup-directory"], "/tmp/x_backup");
        assert_eq!(json["callback_file"], "/opt/app/client");
        assert_eq!(json["moves"][0]["error-id"], "move-file-0");
        assert_eq!(json["moves"][0]["source"], "/tmp/x/a");
    }
}
