// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    Result,
    api::RemoteMetadataClient,
    installer::{Encoding, download},
    paths,
    types::{ArtifactStatus, CachedArtifact, UiPackInfo},
};

use super::{cache::LocalArtifactCache, selector::UiPackRemote};

impl UiPackRemote for RemoteMetadataClient {
    fn fetch_ui_packs(&self) -> Result<Vec<UiPackInfo>> {
        self.fetch_ui_pack_catalog()
    }

    fn download_ui_pack(&self, info: &UiPackInfo, cache: &mut LocalArtifactCache) -> Result<CachedArtifact> {
        let target = cache.directory().join(paths::ui_pack_file_name(
            &info.channel,
            &info.versions_hash,
            info.timestamp_millis,
        ));
        let url = self.ui_download_url(info);
        log::debug!(target: "uipack", "downloading ui pack from {url} to {}", target.display());

        let downloaded = download(
            self.ui_download_client(),
            url,
            &target,
            Encoding::Raw,
            &mut |_| {},
        )?;
        log::info!(target: "uipack", "downloaded ui pack {} ({} bytes)", info.versions_hash, downloaded.size);

        let artifact = CachedArtifact {
            download_timestamp: paths::now_millis(),
            local_file_path: downloaded.path,
            checksum: Some(downloaded.checksum),
            pack_info: info.clone(),
            status: ArtifactStatus::Valid,
        };
        cache.push(artifact.clone());
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::ApiConfig,
        test_support::{Reply, TestServer, closed_port_url, gzip, tar_archive},
    };

    fn info() -> UiPackInfo {
        UiPackInfo {
            timestamp_millis: 1_600_000_000_000,
            version_string: "1.2".to_string(),
            versions_hash: "abc123".to_string(),
            channel: "release".to_string(),
            required_client_version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn download_records_pack_in_cache() {
        let pack = gzip(&tar_archive(&[("index.html", b"<html>")]));
        let body = pack.clone();
        let server = TestServer::start(move |target| {
            assert!(target.contains("type=ui-download"));
            assert!(target.contains("timestamp=1600000000"));
            Reply::ok(body.clone())
        });
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LocalArtifactCache::load(dir.path().join("ui-cache/cache.json"));
        let client = RemoteMetadataClient::new(server.url(), ApiConfig::new()).unwrap();

        let artifact = client.download_ui_pack(&info(), &mut cache).unwrap();

        assert_eq!(artifact.local_file_path, dir.path().join("ui-cache/release_abc123_1600000000000.tar.gz"));
        assert_eq!(std::fs::read(&artifact.local_file_path).unwrap(), pack);
        assert_eq!(artifact.checksum, Some(format!("{:x}", md5::compute(&pack))));
        assert_eq!(cache.packs(), &[artifact]);
        assert_eq!(LocalArtifactCache::load(dir.path().join("ui-cache/cache.json")).packs().len(), 1);
    }

    #[test]
    fn failed_download_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LocalArtifactCache::load(dir.path().join("cache.json"));
        let client = RemoteMetadataClient::new(&closed_port_url(), ApiConfig::new()).unwrap();

        assert!(client.download_ui_pack(&info(), &mut cache).is_err());
        assert!(cache.packs().is_empty());
    }
}
