// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use reqwest::Url;

use crate::{
    Error, Result,
    installer::transfer_client,
    paths,
    types::{UiPackInfo, UpdateCatalog, UpdateVersion},
    version::Version,
};

use super::catalog::{parse_ui_catalog, parse_update_catalog};
use super::config::{API_ENDPOINT, ApiConfig, CONNECT_TIMEOUT, FetchMode, USER_AGENT};

struct CachedCatalog {
    fetched_at: Instant,
    catalog: Arc<UpdateCatalog>,
}

/// Thread-safe client for the update server's metadata and download endpoints.
///
/// The update catalog is cached for [`ApiConfig::catalog_ttl`]. The cache lock
/// is held for the duration of a fetch, so concurrent callers wait for and
/// share a single in-flight request.
pub struct RemoteMetadataClient {
    client: reqwest::blocking::Client,
    update_transfer: reqwest::blocking::Client,
    ui_transfer: reqwest::blocking::Client,
    endpoint: Url,
    config: ApiConfig,
    catalog_cache: Mutex<Option<CachedCatalog>>,
}

impl RemoteMetadataClient {
    /// Creates a client for the server at `server_url`.
    pub fn new(server_url: &str, config: ApiConfig) -> Result<Self> {
        let base = if server_url.ends_with('/') {
            server_url.to_string()
        } else {
            format!("{server_url}/")
        };
        let endpoint = Url::parse(&base)
            .and_then(|base| base.join(API_ENDPOINT))
            .map_err(|e| Error::other(format!("invalid server url {server_url}: {e}")))?;

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            update_transfer: transfer_client(config.download_timeout)?,
            ui_transfer: transfer_client(config.ui_timeout)?,
            endpoint,
            config,
            catalog_cache: Mutex::new(None),
        })
    }

    /// Client for client update downloads, stalling at most
    /// [`ApiConfig::download_timeout`] between reads.
    pub fn update_download_client(&self) -> &reqwest::blocking::Client {
        &self.update_transfer
    }

    /// Client for UI pack downloads, stalling at most
    /// [`ApiConfig::ui_timeout`] between reads.
    pub fn ui_download_client(&self) -> &reqwest::blocking::Client {
        &self.ui_transfer
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Fetches the client-update catalog under the background timeout.
    pub fn fetch_update_catalog(&self) -> Result<Arc<UpdateCatalog>> {
        self.fetch_update_catalog_with(FetchMode::Background)
    }

    /// Fetches the client-update catalog, reusing a cached result within the TTL.
    ///
    /// A failed fetch leaves the cache empty so the next call retries at once.
    pub fn fetch_update_catalog_with(&self, mode: FetchMode) -> Result<Arc<UpdateCatalog>> {
        let mut cache = self.catalog_cache.lock();
        if let Some(cached) = cache.as_ref()
            && cached.fetched_at.elapsed() < self.config.catalog_ttl
        {
            return Ok(Arc::clone(&cached.catalog));
        }

        *cache = None;
        let url = self.api_url(&[("type", "update-info")]);
        log::debug!(target: "api", "fetching update catalog from {url}");

        let catalog = self
            .get_text(url, self.config.catalog_timeout(mode))
            .and_then(|body| parse_update_catalog(&body))
            .map_err(|e| {
                log::warn!(target: "api", "failed to fetch update catalog: {e}");
                e
            })?;

        let catalog = Arc::new(catalog);
        *cache = Some(CachedCatalog {
            fetched_at: Instant::now(),
            catalog: Arc::clone(&catalog),
        });
        log::debug!(target: "api", "update catalog has {} client builds", catalog.client_versions.len());
        Ok(catalog)
    }

    /// Fetches the UI pack catalog. Never cached.
    pub fn fetch_ui_pack_catalog(&self) -> Result<Vec<UiPackInfo>> {
        let url = self.api_url(&[("type", "ui-info")]);
        log::debug!(target: "api", "loading ui pack information from {url}");

        let body = self.get_text(url, self.config.ui_timeout)?;
        parse_ui_catalog(&body)
    }

    /// Newest client build for an exact channel/platform/arch match.
    pub fn newest_version_for(&self, channel: &str, platform: &str, arch: &str) -> Result<Option<UpdateVersion>> {
        let catalog = self.fetch_update_catalog()?;
        Ok(catalog.newest_version_for(channel, platform, arch).cloned())
    }

    /// Distinct client channels the server publishes.
    pub fn available_channels(&self) -> Result<Vec<String>> {
        Ok(self.fetch_update_catalog()?.channels())
    }

    /// The newest build for this platform on `channel`, if it is newer than `local`.
    ///
    /// Development builds never see updates.
    pub fn available_client_update(&self, local: &Version, channel: &str) -> Result<Option<UpdateVersion>> {
        let newest = self.newest_version_for(channel, paths::platform_identifier(), paths::arch_identifier())?;
        Ok(newest.filter(|remote| !local.is_development_version() && remote.version.newer_than(local, false)))
    }

    /// Download URL of a client update package.
    pub fn client_download_url(&self, version: &UpdateVersion) -> Url {
        self.api_url(&[
            ("type", "update-download"),
            ("platform", &version.platform),
            ("arch", &version.arch),
            ("version", &version.version.to_string_with(false)),
            ("channel", &version.channel),
        ])
    }

    /// Download URL of a UI pack. The server expects the timestamp in seconds.
    pub fn ui_download_url(&self, info: &UiPackInfo) -> Url {
        self.api_url(&[
            ("type", "ui-download"),
            ("git-ref", &info.versions_hash),
            ("version", &info.version_string),
            ("timestamp", &(info.timestamp_millis / 1000).to_string()),
            ("channel", &info.channel),
        ])
    }

    fn api_url(&self, params: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(params);
        url
    }

    fn get_text(&self, url: Url, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| Error::unreachable(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::bad_status(status.to_string()));
        }

        response
            .text()
            .map_err(|e| Error::unreachable(format!("failed to read response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::test_support::{Reply, TestServer, closed_port_url};

    const CATALOG: &str = r#"{
        "success": true,
        "release": [
            {"platform": "linux", "arch": "x64", "version": {"major": 1, "minor": 5, "patch": 0, "build": 0, "timestamp": 0}},
            {"platform": "win32", "arch": "x64", "version": {"major": 1, "minor": 5, "patch": 1, "build": 0, "timestamp": 0}}
        ],
        "beta": [
            {"platform": "linux", "arch": "x64", "version": {"major": 1, "minor": 6, "patch": 0, "build": 0, "timestamp": 0}}
        ]
    }"#;

    fn client_for(url: &str) -> RemoteMetadataClient {
        RemoteMetadataClient::new(url, ApiConfig::new()).unwrap()
    }

    #[test]
    fn catalog_is_cached_within_ttl() {
        let server = TestServer::fixed(200, CATALOG);
        let client = client_for(server.url());

        let first = client.fetch_update_catalog().unwrap();
        let second = client.fetch_update_catalog().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(server.hits(), 1);
    }

    #[test]
    fn expired_catalog_is_refetched() {
        let server = TestServer::fixed(200, CATALOG);
        let config = ApiConfig {
            catalog_ttl: Duration::ZERO,
            ..ApiConfig::new()
        };
        let client = RemoteMetadataClient::new(server.url(), config).unwrap();

        client.fetch_update_catalog().unwrap();
        client.fetch_update_catalog().unwrap();
        assert_eq!(server.hits(), 2);
    }

    #[test]
    fn concurrent_callers_share_one_request() {
        let server = TestServer::start(|_| Reply::ok(CATALOG).delayed(Duration::from_millis(200)));
        let client = client_for(server.url());

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| client.fetch_update_catalog_with(FetchMode::Interactive).unwrap());
            }
        });

        assert_eq!(server.hits(), 1);
    }

    #[test]
    fn failed_fetch_is_not_cached() {
        let server = TestServer::start({
            let calls = std::sync::atomic::AtomicUsize::new(0);
            move |_| {
                if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Reply::status(500)
                } else {
                    Reply::ok(CATALOG)
                }
            }
        });
        let client = client_for(server.url());

        let err = client.fetch_update_catalog().unwrap_err();
        assert_eq!(err.code(), "remote-bad-status");
        assert!(client.fetch_update_catalog().is_ok());
        assert_eq!(server.hits(), 2);
    }

    #[test]
    fn non_200_success_status_is_rejected() {
        let server = TestServer::start(|_| Reply {
            status: 203,
            ..Reply::ok(CATALOG)
        });
        let client = client_for(server.url());

        let err = client.fetch_update_catalog().unwrap_err();
        assert_eq!(err.code(), "remote-bad-status");
        assert!(err.to_string().contains("203"));
    }

    #[test]
    fn unreachable_server_is_reported() {
        let client = client_for(&closed_port_url());
        let err = client.fetch_update_catalog().unwrap_err();
        assert_eq!(err.code(), "remote-unreachable");
        assert!(err.is_transient());
    }

    #[test]
    fn channels_and_newest_versions() {
        let server = TestServer::fixed(200, CATALOG);
        let client = client_for(server.url());

        assert_eq!(client.available_channels().unwrap(), vec!["release", "beta"]);
        let newest = client.newest_version_for("beta", "linux", "x64").unwrap().unwrap();
        assert_eq!(newest.version.to_string(), "1.6.0");
        assert!(client.newest_version_for("beta", "win32", "x64").unwrap().is_none());
    }

    #[test]
    fn development_builds_never_see_updates() {
        let server = TestServer::fixed(
            200,
            CATALOG
                .replace("\"linux\"", &format!("\"{}\"", paths::platform_identifier()))
                .replace("\"x64\"", &format!("\"{}\"", paths::arch_identifier())),
        );
        let client = client_for(server.url());

        assert!(client.available_client_update(&Version::default(), "release").unwrap().is_none());

        let update = client
            .available_client_update(&Version::parse("1.4.0"), "release")
            .unwrap()
            .unwrap();
        assert!(update.version.newer_than(&Version::parse("1.4.0"), false));
        assert!(client.available_client_update(&Version::parse("9.0.0"), "release").unwrap().is_none());
    }

    #[test]
    fn download_urls_carry_query_parameters() {
        let client = client_for("http://updates.local");
        let url = client.ui_download_url(&UiPackInfo {
            timestamp_millis: 1_600_000_000_000,
            version_string: "1.2.0".to_string(),
            versions_hash: "abc".to_string(),
            channel: "release".to_string(),
            required_client_version: "1.4.0".to_string(),
        });
        assert_eq!(url.path(), "/api.php");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("type".to_string(), "ui-download".to_string())));
        assert!(query.contains(&("git-ref".to_string(), "abc".to_string())));
        assert!(query.contains(&("timestamp".to_string(), "1600000000".to_string())));
    }

    #[test]
    fn ui_catalog_is_not_cached() {
        let server = TestServer::fixed(200, r#"{"success": true, "versions": []}"#);
        let client = client_for(server.url());
        assert!(client.fetch_ui_pack_catalog().unwrap().is_empty());
        assert!(client.fetch_ui_pack_catalog().unwrap().is_empty());
        assert_eq!(server.hits(), 2);
    }
}
