// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fs::{self, File},
    path::Path,
};

use flate2::read::GzDecoder;

use crate::{Error, Result, installer::extract::unpack_entries, types::CachedArtifact};

/// Unpacks a gzip'd UI pack tarball into `dest`.
///
/// A stored checksum must still match the file. Any entry failure fails the
/// whole pack.
pub(crate) fn unpack_ui_pack(pack: &CachedArtifact, dest: &Path) -> Result<()> {
    let path = &pack.local_file_path;

    if let Some(expected) = pack.checksum.as_deref() {
        let data = fs::read(path).map_err(|e| Error::extraction(format!("failed to open ui pack: {e}")))?;
        let actual = format!("{:x}", md5::compute(&data));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::extraction(format!(
                "checksum mismatch for {} (expected {expected}, got {actual})",
                path.display()
            )));
        }
    }

    let file = File::open(path).map_err(|e| Error::extraction(format!("failed to open ui pack: {e}")))?;
    unpack_entries(GzDecoder::new(file), dest, |_, result| result)
        .map_err(|e| Error::extraction(format!("failed to unpack the ui pack: {e}")))?;

    if !dest.join("index.html").is_file() {
        log::warn!(target: "uipack", "ui pack {} has no index.html", pack.pack_info.versions_hash);
    }
    log::debug!(target: "uipack", "unpacked {} to {}", path.display(), dest.display());
    Ok(())
}
