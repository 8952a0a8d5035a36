// SPDX-License-Identifier: MIT OR Apache-2.0

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::{
    Error, Result,
    paths::TempRegistry,
    types::{CachedArtifact, UiPackInfo},
    version::Version,
};

use super::{cache::LocalArtifactCache, unpack::unpack_ui_pack};

pub(super) const UNPACK_DIR_PREFIX: &str = "TeaClient-";
const INVALID_REASON: &str = "failed to unpack";

/// Source of remote UI packs.
pub trait UiPackRemote {
    /// Lists the packs the server offers.
    fn fetch_ui_packs(&self) -> Result<Vec<UiPackInfo>>;

    /// Downloads `info` into the cache directory and records it in `cache`.
    fn download_ui_pack(&self, info: &UiPackInfo, cache: &mut LocalArtifactCache) -> Result<CachedArtifact>;
}

/// Picks the freshest usable UI pack among cached and remote candidates.
pub(crate) struct UiPackSelector<'a> {
    pub channel: &'a str,
    pub client_version: Version,
    /// Not a candidate itself; bounds which cached packs are worth trying.
    pub bundled: Option<&'a CachedArtifact>,
    pub cache: &'a Mutex<LocalArtifactCache>,
    pub remote: &'a dyn UiPackRemote,
    pub temp_parent: &'a Path,
    pub temp_dirs: &'a TempRegistry,
    pub no_cache: bool,
    pub debug: bool,
}

/// A pack that unpacked successfully.
#[derive(Debug, Clone)]
pub(crate) struct SelectedPack {
    pub pack: CachedArtifact,
    pub root: PathBuf,
}

impl UiPackSelector<'_> {
    /// Runs the selection. With `force_remote`, the remote pack is downloaded
    /// even when it does not look newer than what is available locally.
    pub fn select(&self, force_remote: bool, on_status: &mut dyn FnMut(&str, f64)) -> Result<SelectedPack> {
        on_status("Fetching info", 0.0);

        let mut candidates = self.cached_candidates();
        log::debug!(target: "uipack", "found {} usable cached ui packs on channel {}", candidates.len(), self.channel);

        on_status("Loading remote info", 0.25);
        let remote_dropped = self.consider_remote(&mut candidates, force_remote, on_status);

        on_status("Unpacking UI", 0.7);
        candidates.sort_by_key(|pack| pack.pack_info.timestamp_millis);

        let mut failed = Vec::new();
        while let Some(pack) = candidates.pop() {
            log::info!(target: "uipack", "trying ui pack {} ({}), downloaded at {}",
                pack.pack_info.versions_hash, pack.pack_info.timestamp_millis, pack.download_timestamp);

            match self.unpack(&pack) {
                Ok(root) => {
                    on_status("UI pack loaded", 1.0);
                    self.invalidate(&failed);
                    return Ok(SelectedPack { pack, root });
                }
                Err(e) => {
                    log::warn!(target: "uipack", "failed to unpack ui pack {}: {e}", pack.pack_info.versions_hash);
                    failed.push(pack);
                }
            }
        }

        if remote_dropped {
            log::info!(target: "uipack", "no local pack usable, forcing the remote pack");
            let selected = self.select(true, on_status)?;
            self.invalidate(&failed);
            return Ok(selected);
        }

        Err(Error::no_ui_pack("failed to load any ui pack (local and remote)"))
    }

    fn cached_candidates(&self) -> Vec<CachedArtifact> {
        if self.no_cache {
            log::info!(target: "uipack", "ignoring local ui cache");
            return Vec::new();
        }

        let cache = self.cache.lock();
        cache
            .packs()
            .iter()
            .filter(|pack| pack.status.is_valid())
            .filter(|pack| pack.pack_info.channel == self.channel)
            .filter(|pack| {
                self.bundled
                    .is_none_or(|bundled| pack.pack_info.timestamp_millis > bundled.pack_info.timestamp_millis)
            })
            .filter(|pack| self.satisfies(&pack.pack_info.required_client_version))
            .cloned()
            .collect()
    }

    fn satisfies(&self, required: &str) -> bool {
        let required = Version::parse(required);
        self.client_version.is_development_version()
            || self.client_version.newer_than(&required, true)
            || self.client_version == required
    }

    /// Adds the remote pack to `candidates` when it is worth downloading.
    ///
    /// Returns true if a pack newer than the bundled one was skipped only
    /// because a local candidate looked at least as new.
    fn consider_remote(
        &self,
        candidates: &mut Vec<CachedArtifact>,
        force: bool,
        on_status: &mut dyn FnMut(&str, f64),
    ) -> bool {
        let remote = match self.remote.fetch_ui_packs() {
            Ok(packs) => packs.into_iter().find(|pack| pack.channel == self.channel),
            Err(e) => {
                log::warn!(target: "uipack", "failed to query remote ui packs: {e}");
                return false;
            }
        };
        let Some(remote) = remote else {
            log::info!(target: "uipack", "remote server has no ui packs for channel {}", self.channel);
            return false;
        };

        let newest_local = candidates
            .iter()
            .map(|pack| pack.pack_info.timestamp_millis)
            .fold(self.bundled.map_or(0, |b| b.download_timestamp), u64::max);
        log::debug!(target: "uipack", "remote version {}, local version {newest_local}", remote.timestamp_millis);

        let required = Version::parse(&remote.required_client_version);
        if required.newer_than(&self.client_version, false)
            && !self.client_version.is_development_version()
            && !self.debug
        {
            log::info!(target: "uipack", "ignoring remote ui pack, it requires client {} (running {})",
                remote.required_client_version, self.client_version);
            return false;
        }

        if remote.timestamp_millis <= newest_local && !force {
            return self
                .bundled
                .is_some_and(|bundled| remote.timestamp_millis > bundled.download_timestamp);
        }

        on_status("Downloading new UI pack", 0.55);
        log::info!(target: "uipack", "downloading ui pack {} ({}), forced: {force}",
            remote.versions_hash, remote.timestamp_millis);
        let downloaded = {
            let mut cache = self.cache.lock();
            self.remote.download_ui_pack(&remote, &mut cache)
        };
        match downloaded {
            Ok(pack) => candidates.push(pack),
            Err(e) => log::error!(target: "uipack", "failed to download new ui pack: {e}"),
        }
        false
    }

    fn unpack(&self, pack: &CachedArtifact) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(UNPACK_DIR_PREFIX)
            .tempdir_in(self.temp_parent)
            .map_err(|e| Error::extraction(format!("failed to create temporary directory: {e}")))?;

        unpack_ui_pack(pack, dir.path())?;
        Ok(self.temp_dirs.register(dir))
    }

    fn invalidate(&self, failed: &[CachedArtifact]) {
        self.cache.lock().invalidate(failed, INVALID_REASON);
    }
}
