// SPDX-License-Identifier: MIT OR Apache-2.0

mod catalog;
mod client;
mod config;

pub use client::RemoteMetadataClient;
pub use config::{ApiConfig, FetchMode, INSTALL_LOCK_TIMEOUT_MILLIS, USER_AGENT};
pub(crate) use config::CONNECT_TIMEOUT;
