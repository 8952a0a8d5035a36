// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

/// A client version: `major.minor.patch[-build]` plus an optional build timestamp.
///
/// `build == 0` means "no build suffix". A timestamp of `0` means "unknown".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
    #[serde(rename = "timestamp")]
    pub timestamp_millis: u64,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32, timestamp_millis: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
            timestamp_millis,
        }
    }

    /// Parses `"major.minor.patch[-build] [[timestamp]]"`.
    ///
    /// Never fails: missing or malformed segments become `0`.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let (version_part, timestamp_part) = match input.find(|c: char| c.is_whitespace() || c == '[') {
            Some(index) => (&input[..index], &input[index..]),
            None => (input, ""),
        };

        let (numbers, build) = match version_part.split_once('-') {
            Some((numbers, build)) => (numbers, parse_segment(build)),
            None => (version_part, 0),
        };

        let mut segments = numbers.split('.');
        let major = segments.next().map(parse_segment).unwrap_or(0);
        let minor = segments.next().map(parse_segment).unwrap_or(0);
        let patch = segments.next().map(parse_segment).unwrap_or(0);

        let timestamp = timestamp_part
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim();

        Self {
            major,
            minor,
            patch,
            build,
            timestamp_millis: timestamp.parse().unwrap_or(0),
        }
    }

    /// A from-source build carries no version at all.
    pub fn is_development_version(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.patch == 0 && self.build == 0
    }

    /// Returns true if `self` is strictly newer than `other`.
    ///
    /// With `timestamp_primary`, differing non-zero timestamps decide the order
    /// before the numeric fields are looked at.
    pub fn newer_than(&self, other: &Version, timestamp_primary: bool) -> bool {
        if timestamp_primary
            && self.timestamp_millis != 0
            && other.timestamp_millis != 0
            && self.timestamp_millis != other.timestamp_millis
        {
            return self.timestamp_millis > other.timestamp_millis;
        }

        self.numeric_key() > other.numeric_key()
    }

    /// Formats the version, optionally appending ` [timestamp]`.
    pub fn to_string_with(&self, include_timestamp: bool) -> String {
        let mut result = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.build > 0 {
            result.push_str(&format!("-{}", self.build));
        }
        if include_timestamp && self.timestamp_millis > 0 {
            result.push_str(&format!(" [{}]", self.timestamp_millis));
        }
        result
    }

    fn numeric_key(&self) -> (u32, u32, u32, u32) {
        (self.major, self.minor, self.patch, self.build)
    }
}

fn parse_segment(segment: &str) -> u32 {
    segment.trim().parse().unwrap_or(0)
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        if self.numeric_key() != other.numeric_key() {
            return false;
        }
        if self.timestamp_millis != 0 && other.timestamp_millis != 0 {
            return self.timestamp_millis == other.timestamp_millis;
        }
        true
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(true))
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}
