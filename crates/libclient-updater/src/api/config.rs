// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

pub(crate) const API_ENDPOINT: &str = "api.php";
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(2);
pub(crate) const DEFAULT_INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_UI_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(60 * 60);

/// How long the installer waits for the running executable to release its file.
pub const INSTALL_LOCK_TIMEOUT_MILLIS: u64 = 10_000;

pub const USER_AGENT: &str = concat!("client-updater/", env!("CARGO_PKG_VERSION"));

/// Timeouts and cache lifetimes for update server interactions.
#[derive(Debug, Clone, Copy)]
pub struct ApiConfig {
    /// Background catalog fetches.
    pub metadata_timeout: Duration,
    /// Catalog fetches while an operator is waiting on the answer.
    pub interactive_timeout: Duration,
    /// UI pack metadata requests, and the longest a UI pack download may
    /// stall between two reads.
    pub ui_timeout: Duration,
    /// The longest a client update download may stall between two reads.
    pub download_timeout: Duration,
    /// How long a successful update catalog is reused.
    pub catalog_ttl: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiConfig {
    pub const fn new() -> Self {
        Self {
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            interactive_timeout: DEFAULT_INTERACTIVE_TIMEOUT,
            ui_timeout: DEFAULT_UI_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            catalog_ttl: DEFAULT_CATALOG_TTL,
        }
    }
}

/// Which timeout a catalog request runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Background,
    Interactive,
}

impl ApiConfig {
    pub(crate) fn catalog_timeout(&self, mode: FetchMode) -> Duration {
        match mode {
            FetchMode::Background => self.metadata_timeout,
            FetchMode::Interactive => self.interactive_timeout,
        }
    }
}
