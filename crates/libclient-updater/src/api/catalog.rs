// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding of the update server's JSON envelopes.
//!
//! Both listings share the same envelope: a `success` flag, an optional `msg`
//! carrying the server's error text, and the payload.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    Error, Result,
    types::{UiPackInfo, UpdateCatalog, UpdateVersion},
    version::Version,
};

/// Catalog channel carrying the external installer's own version.
pub(crate) const UPDATER_CHANNEL: &str = "updater";

const ENVELOPE_SUCCESS: &str = "success";
const ENVELOPE_MESSAGE: &str = "msg";

#[derive(Debug, Deserialize)]
struct CatalogRow {
    platform: String,
    arch: String,
    version: Version,
}

#[derive(Debug, Deserialize)]
struct UiPackRow {
    channel: String,
    #[serde(rename = "git-ref")]
    git_ref: String,
    #[serde(default)]
    version: String,
    #[serde(deserialize_with = "seconds_from_number_or_string")]
    timestamp: u64,
    #[serde(default)]
    required_client: String,
}

/// Parses the body of `api.php?type=update-info`.
pub(crate) fn parse_update_catalog(body: &str) -> Result<UpdateCatalog> {
    let object = parse_envelope(body)?;

    let mut catalog = UpdateCatalog::default();
    for (channel, rows) in object {
        if channel == ENVELOPE_SUCCESS || channel == ENVELOPE_MESSAGE {
            continue;
        }

        let rows: Vec<CatalogRow> = serde_json::from_value(rows)
            .map_err(|e| Error::bad_body(format!("invalid entries for channel {channel}: {e}")))?;

        for row in rows {
            let version = UpdateVersion {
                channel: channel.clone(),
                platform: row.platform,
                arch: row.arch,
                version: row.version,
            };

            if channel == UPDATER_CHANNEL {
                catalog.updater_version = Some(version);
            } else {
                catalog.client_versions.push(version);
            }
        }
    }

    Ok(catalog)
}

/// Parses the body of `api.php?type=ui-info`.
///
/// The server reports timestamps in seconds; they are normalised to millis.
pub(crate) fn parse_ui_catalog(body: &str) -> Result<Vec<UiPackInfo>> {
    let mut object = parse_envelope(body)?;

    let versions = match object.remove("versions") {
        Some(versions @ Value::Array(_)) => versions,
        _ => return Err(Error::bad_body("response contains invalid data")),
    };

    let rows: Vec<UiPackRow> =
        serde_json::from_value(versions).map_err(|e| Error::bad_body(format!("invalid ui pack entry: {e}")))?;

    Ok(rows
        .into_iter()
        .map(|row| UiPackInfo {
            timestamp_millis: row.timestamp.saturating_mul(1000),
            version_string: row.version,
            versions_hash: row.git_ref,
            channel: row.channel,
            required_client_version: row.required_client,
        })
        .collect())
}

fn parse_envelope(body: &str) -> Result<Map<String, Value>> {
    if body.trim().is_empty() {
        return Err(Error::bad_body("missing body in response"));
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        log::debug!(target: "api", "unparsable response body: {body}");
        Error::bad_body(format!("failed to parse response: {e}"))
    })?;

    let Value::Object(object) = value else {
        return Err(Error::bad_body("response is not an object"));
    };

    if !object.get(ENVELOPE_SUCCESS).and_then(Value::as_bool).unwrap_or(false) {
        let message = object
            .get(ENVELOPE_MESSAGE)
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(Error::bad_body(format!("action failed ({message})")));
    }

    Ok(object)
}

fn seconds_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(seconds) => Ok(seconds),
        Seconds::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}
