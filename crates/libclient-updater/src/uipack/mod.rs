// SPDX-License-Identifier: MIT OR Apache-2.0

//! UI pack acquisition: the local cache, the bundled pack and the selection
//! ladder that picks between them and the update server.

mod bundled;
mod cache;
mod remote;
mod selector;
mod unpack;

use std::{
    fmt,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use parking_lot::Mutex;

use crate::{Error, Result, config::Config, paths::TempRegistry, types::CachedArtifact, version::Version};

pub use cache::LocalArtifactCache;
pub use selector::UiPackRemote;

use bundled::load_bundled;
use selector::UiPackSelector;

const INDEX_FILE: &str = "index.html";

/// Where the UI is loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UiLoadMethod {
    /// Freshest compatible pack from the cache or the server.
    Pack = 0,
    /// The pack shipped with the client, without freshness checks.
    BundledPack = 1,
    /// Served live by the update server.
    DevelopServer = 3,
}

impl TryFrom<u8> for UiLoadMethod {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Pack),
            1 => Ok(Self::BundledPack),
            3 => Ok(Self::DevelopServer),
            other => Err(Error::other(format!("unknown ui load method {other}"))),
        }
    }
}

impl FromStr for UiLoadMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pack" => Ok(Self::Pack),
            "bundled" | "bundled-pack" => Ok(Self::BundledPack),
            "dev" | "develop" | "develop-server" => Ok(Self::DevelopServer),
            other => other
                .parse::<u8>()
                .map_err(|_| Error::other(format!("unknown ui load method '{s}'")))
                .and_then(Self::try_from),
        }
    }
}

impl fmt::Display for UiLoadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pack => "pack",
            Self::BundledPack => "bundled",
            Self::DevelopServer => "dev",
        })
    }
}

/// The UI the client should show.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedUiPack {
    /// A pack unpacked into a temporary directory.
    Unpacked {
        root: PathBuf,
        pack: CachedArtifact,
        bundled: bool,
    },
    /// A live UI served from `url`.
    DevServer { url: String },
}

impl LoadedUiPack {
    /// URL or path of the UI entry point.
    pub fn entry_url(&self) -> String {
        match self {
            Self::Unpacked { root, .. } => root.join(INDEX_FILE).display().to_string(),
            Self::DevServer { url } => url.clone(),
        }
    }

    /// Maps a UI request path onto a file inside the unpacked root.
    ///
    /// Query strings and fragments are dropped and `/` serves `index.html`.
    /// Returns `None` for dev-server UIs and for paths leaving the root.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let Self::Unpacked { root, .. } = self else {
            return None;
        };

        let path = request_path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_start_matches('/');
        if path.is_empty() {
            return Some(root.join(INDEX_FILE));
        }

        let mut resolved = root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !resolved.pop() || !resolved.starts_with(root) {
                        log::warn!(target: "uipack", "refusing request outside the ui root: {request_path}");
                        return None;
                    }
                }
                Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        resolved.starts_with(root).then_some(resolved)
    }
}

/// Everything the ladder needs from the pipeline.
pub(crate) struct UiLoadContext<'a> {
    pub config: &'a Config,
    pub remote: &'a dyn UiPackRemote,
    pub cache: &'a Mutex<LocalArtifactCache>,
    pub temp_dirs: &'a TempRegistry,
    pub channel: &'a str,
    pub client_version: Version,
}

/// Loads the UI, honouring a forced method or walking pack → bundled.
///
/// When every rung fails the first error is returned.
pub(crate) fn load_ui_pack(ctx: &UiLoadContext<'_>, on_status: &mut dyn FnMut(&str, f64)) -> Result<LoadedUiPack> {
    if let Some(method) = ctx.config.ui_load_method {
        log::info!(target: "uipack", "ui load method forced to {method}");
        return load_with(ctx, method, on_status);
    }

    let first_error = match load_with(ctx, UiLoadMethod::Pack, on_status) {
        Ok(loaded) => return Ok(loaded),
        Err(e) => {
            log::warn!(target: "uipack", "failed to load a ui pack, falling back to the bundled one: {e}");
            e
        }
    };

    match load_with(ctx, UiLoadMethod::BundledPack, on_status) {
        Ok(loaded) => Ok(loaded),
        Err(e) => {
            log::error!(target: "uipack", "failed to load the bundled ui pack: {e}");
            Err(first_error)
        }
    }
}

fn load_with(
    ctx: &UiLoadContext<'_>,
    method: UiLoadMethod,
    on_status: &mut dyn FnMut(&str, f64),
) -> Result<LoadedUiPack> {
    let bundled = load_bundled(ctx.config.resource_path.as_deref());

    match method {
        UiLoadMethod::Pack => {
            let temp_parent = ctx.config.temp_dir();
            let selector = UiPackSelector {
                channel: ctx.channel,
                client_version: ctx.client_version,
                bundled: bundled.as_ref(),
                cache: ctx.cache,
                remote: ctx.remote,
                temp_parent: &temp_parent,
                temp_dirs: ctx.temp_dirs,
                no_cache: ctx.config.ui_no_cache,
                debug: ctx.config.debug,
            };
            let selected = selector.select(false, on_status)?;
            Ok(LoadedUiPack::Unpacked {
                root: selected.root,
                pack: selected.pack,
                bundled: false,
            })
        }
        UiLoadMethod::BundledPack => {
            let pack = bundled.ok_or_else(|| Error::no_ui_pack("missing bundled ui pack"))?;
            on_status("Unpacking bundled UI", 0.5);
            let root = unpack_into_temp(ctx, &pack)?;
            on_status("UI pack loaded", 1.0);
            Ok(LoadedUiPack::Unpacked {
                root,
                pack,
                bundled: true,
            })
        }
        UiLoadMethod::DevelopServer => {
            let url = format!("{}{INDEX_FILE}", ctx.config.server_base());
            log::info!(target: "uipack", "loading ui from {url}");
            Ok(LoadedUiPack::DevServer { url })
        }
    }
}

fn unpack_into_temp(ctx: &UiLoadContext<'_>, pack: &CachedArtifact) -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(selector::UNPACK_DIR_PREFIX)
        .tempdir_in(ctx.config.temp_dir())
        .map_err(|e| Error::extraction(format!("failed to create temporary directory: {e}")))?;
    unpack::unpack_ui_pack(pack, dir.path())?;
    Ok(ctx.temp_dirs.register(dir))
}
