// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fs, path::Path};

use serde::Deserialize;

use crate::{
    Error, Result, paths,
    types::{ArtifactStatus, CachedArtifact, UiPackInfo},
};

/// Sidecar manifest describing the UI pack shipped with the client.
#[derive(Debug, Deserialize)]
struct BundledManifest {
    channel: String,
    version: String,
    git_hash: String,
    /// Unix seconds.
    timestamp: u64,
    required_client: String,
    /// Relative to the manifest's directory.
    filename: String,
}

/// Reads the bundled UI pack beside `resource_path`.
///
/// Returns `None` when the client ships without one.
pub(crate) fn load_bundled(resource_path: Option<&Path>) -> Option<CachedArtifact> {
    let directory = resource_path?.parent()?;
    let manifest_path = directory.join(paths::BUNDLED_UI_MANIFEST);
    if !manifest_path.is_file() {
        log::debug!(target: "uipack", "no bundled ui pack at {}", manifest_path.display());
        return None;
    }

    match read_manifest(&manifest_path, directory) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            log::warn!(target: "uipack", "ignoring bundled ui pack: {e}");
            None
        }
    }
}

fn read_manifest(manifest_path: &Path, directory: &Path) -> Result<CachedArtifact> {
    let manifest: BundledManifest = serde_json::from_str(&fs::read_to_string(manifest_path)?)?;
    if manifest.filename.is_empty() {
        return Err(Error::schema("bundled ui manifest has no file name"));
    }

    let timestamp_millis = manifest.timestamp.saturating_mul(1000);
    Ok(CachedArtifact {
        download_timestamp: timestamp_millis,
        local_file_path: directory.join(&manifest.filename),
        checksum: None,
        pack_info: UiPackInfo {
            timestamp_millis,
            version_string: manifest.version,
            versions_hash: manifest.git_hash,
            channel: manifest.channel,
            required_client_version: manifest.required_client,
        },
        status: ArtifactStatus::Valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_manifest_beside_resources() {
        let dir = tempfile::tempdir().unwrap();
        let resources = dir.path().join("resources");
        fs::create_dir_all(&resources).unwrap();
        fs::write(
            resources.join("bundled-ui.json"),
            r#"{"channel":"release","version":"1.2.0","git_hash":"abc","timestamp":1600000000,"required_client":"1.4.0","filename":"ui.tar.gz"}"#,
        )
        .unwrap();

        let bundled = load_bundled(Some(resources.join("app.asar").as_path())).unwrap();

        assert_eq!(bundled.local_file_path, resources.join("ui.tar.gz"));
        assert_eq!(bundled.pack_info.timestamp_millis, 1_600_000_000_000);
        assert_eq!(bundled.download_timestamp, 1_600_000_000_000);
        assert_eq!(bundled.pack_info.versions_hash, "abc");
    }

    #[test]
    fn missing_or_broken_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let resource = dir.path().join("app.asar");
        assert!(load_bundled(Some(resource.as_path())).is_none());
        assert!(load_bundled(None).is_none());

        fs::write(dir.path().join("bundled-ui.json"), "{").unwrap();
        assert!(load_bundled(Some(resource.as_path())).is_none());
    }
}
