// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result, paths,
    types::{ArtifactStatus, CachedArtifact},
};

pub(crate) const CACHE_VERSION: u32 = 3;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    version: u32,
    cached_packs: Vec<CachedArtifact>,
}

/// Persisted index of downloaded UI packs.
///
/// Read once and written as a whole on every mutation. Entries are never
/// removed, only marked [`ArtifactStatus::Invalid`].
#[derive(Debug)]
pub struct LocalArtifactCache {
    index_path: PathBuf,
    packs: Vec<CachedArtifact>,
}

impl LocalArtifactCache {
    /// Loads the index at `index_path`.
    ///
    /// Never fails: a missing index is empty, and a corrupt or outdated one is
    /// renamed aside before starting empty.
    pub fn load(index_path: impl Into<PathBuf>) -> Self {
        let index_path = index_path.into();
        let packs = match read_index(&index_path) {
            Ok(packs) => packs,
            Err(e) => {
                log::warn!(target: "cache", "failed to load ui cache {}: {e}", index_path.display());
                paths::rename_aside(&index_path);
                Vec::new()
            }
        };
        log::debug!(target: "cache", "loaded {} cached ui packs", packs.len());

        Self { index_path, packs }
    }

    /// Writes the whole index. Failures are logged and reported as `false`.
    pub fn save(&self) -> bool {
        match self.write_index() {
            Ok(()) => true,
            Err(e) => {
                log::error!(target: "cache", "failed to save ui cache {}: {e}", self.index_path.display());
                false
            }
        }
    }

    /// Directory downloaded packs are stored in.
    pub fn directory(&self) -> &Path {
        self.index_path.parent().unwrap_or(Path::new("."))
    }

    pub fn packs(&self) -> &[CachedArtifact] {
        &self.packs
    }

    /// Appends a freshly downloaded pack and persists the index.
    pub fn push(&mut self, artifact: CachedArtifact) {
        self.packs.push(artifact);
        self.save();
    }

    /// Marks every entry matching one of `artifacts` as invalid and persists once.
    pub fn invalidate(&mut self, artifacts: &[CachedArtifact], reason: &str) {
        if artifacts.is_empty() {
            return;
        }

        let now = paths::now_millis();
        for pack in &mut self.packs {
            if artifacts.iter().any(|a| a.same_artifact(pack)) {
                log::info!(target: "cache", "invalidating ui pack {} ({reason})", pack.pack_info.versions_hash);
                pack.status = ArtifactStatus::Invalid {
                    reason: reason.to_string(),
                    timestamp: now,
                };
            }
        }
        self.save();
    }

    fn write_index(&self) -> Result<()> {
        fs::create_dir_all(self.directory())?;
        let file = CacheFile {
            version: CACHE_VERSION,
            cached_packs: self.packs.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&self.index_path, json).map_err(|e| Error::disk_write(e.to_string()))
    }
}

fn read_index(path: &Path) -> Result<Vec<CachedArtifact>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let value: serde_json::Value = serde_json::from_str(&content)?;
    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(CACHE_VERSION)) {
        return Err(Error::schema(format!("unsupported cache version {version:?}")));
    }

    let file: CacheFile = serde_json::from_value(value)?;
    Ok(file.cached_packs)
}
