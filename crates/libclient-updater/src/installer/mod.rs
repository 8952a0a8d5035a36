// SPDX-License-Identifier: MIT OR Apache-2.0

pub(crate) mod download;
mod executor;
pub(crate) mod extract;
mod host;
pub(crate) mod plan;
mod preflight;
pub(crate) mod privilege;

pub use download::{Downloaded, Encoding, download, transfer_client};
pub use executor::{
    InstallStrategy, PreparedUpdate, UnixInstaller, UpdateSession, UpdateState, WindowsInstaller,
    platform_strategy,
};
pub use host::{HostHooks, SystemHost};
pub use plan::{build_install_plan, write_install_plan};
pub use preflight::{check_archive, check_update_file};

#[cfg(test)]
pub(crate) use host::fake;
