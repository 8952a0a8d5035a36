// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report passed back by the installer when it relaunches the client.

use std::collections::BTreeMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;

use crate::installer::plan::{CALLBACK_FAILURE_FLAG, CALLBACK_SUCCESS_FLAG};

/// Outcome of an install, decoded from the relaunch arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandoffReport {
    pub success: bool,
    /// False when the payload could not be decoded; the other fields are
    /// then empty.
    pub parsed: bool,
    pub log_file: Option<String>,
    pub error_id: Option<String>,
    pub error_message: Option<String>,
    /// Every `key:value` pair of the payload, including the typed ones.
    pub values: BTreeMap<String, String>,
    /// Bare keys without a value.
    pub flags: Vec<String>,
}

impl HandoffReport {
    /// Looks for an installer callback among `args`.
    ///
    /// Accepts both `--update-succeed-new=<payload>` and the flag followed by
    /// the payload as the next argument.
    pub fn from_args<I, S>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            for (flag, success) in [(CALLBACK_SUCCESS_FLAG, true), (CALLBACK_FAILURE_FLAG, false)] {
                let Some(rest) = arg.strip_prefix(flag) else {
                    continue;
                };
                let payload = match rest.strip_prefix('=') {
                    Some(payload) => payload.to_string(),
                    None if rest.is_empty() => args.next().map(|next| next.as_ref().to_string()).unwrap_or_default(),
                    None => continue,
                };
                return Some(Self::decode(success, &payload));
            }
        }
        None
    }

    /// Decodes a base64 payload of `;`-separated entries.
    pub fn decode(success: bool, payload: &str) -> Self {
        let mut report = Self {
            success,
            ..Self::default()
        };

        match decode_entries(payload) {
            Ok((values, flags)) => {
                report.log_file = values.get("log_file").cloned();
                report.error_id = values.get("error_id").cloned();
                report.error_message = values.get("error_message").cloned();
                report.values = values;
                report.flags = flags;
                report.parsed = true;
            }
            Err(e) => log::warn!(target: "install", "failed to parse update response data: {e}"),
        }
        report
    }
}

fn decode_entries(payload: &str) -> Result<(BTreeMap<String, String>, Vec<String>), String> {
    let decoded = STANDARD.decode(payload.trim()).map_err(|e| e.to_string())?;
    let decoded = String::from_utf8(decoded).map_err(|e| e.to_string())?;

    let mut values = BTreeMap::new();
    let mut flags = Vec::new();
    for part in decoded.split(';').filter(|part| !part.is_empty()) {
        match part.split_once(':') {
            Some((key, value)) => {
                let value = STANDARD.decode(value).map_err(|e| format!("{key}: {e}"))?;
                values.insert(key.to_string(), String::from_utf8_lossy(&value).into_owned());
            }
            None => flags.push(part.to_string()),
        }
    }
    Ok((values, flags))
}

/// Builds a payload in the format [`HandoffReport::decode`] reads.
pub fn encode_handoff(pairs: &[(&str, &str)], flags: &[&str]) -> String {
    let parts: Vec<String> = pairs
        .iter()
        .map(|(key, value)| format!("{key}:{}", STANDARD.encode(value)))
        .chain(flags.iter().map(|flag| flag.to_string()))
        .collect();
    STANDARD.encode(parts.join(";"))
}
