// SPDX-License-Identifier: MIT OR Apache-2.0

use bytesize::ByteSize;
use comfy_table::{Attribute, Cell, CellAlignment, Table, presets};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::exit_code::ExitCode;
use libclient_updater::{Error, HandoffReport, PreparedUpdate, UpdateVersion, Version};

/// Verbosity level for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quiet => write!(f, "quiet"),
            Self::Normal => write!(f, "normal"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

/// Generic JSON output wrapper for CLI responses.
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            code: None,
            data: Some(data),
        }
    }

    pub fn err(error: &Error) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            code: Some(error.code()),
            data: None,
        }
    }
}

pub fn output_json<T: Serialize>(data: T) -> libclient_updater::Result<ExitCode> {
    let output = JsonOutput::ok(&data);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::Success)
}

/// Prints an error, with the manual command when one exists.
pub fn output_error(json: bool, error: &Error) {
    if json {
        let output: JsonOutput<()> = JsonOutput::err(error);
        match serde_json::to_string(&output) {
            Ok(line) => println!("{line}"),
            Err(_) => eprintln!("error: {error}"),
        }
        return;
    }

    eprintln!("{} {error} ({})", "error:".bold().red(), error.code());
    if let Some(command) = error.remediation() {
        eprintln!();
        eprintln!("run the following command to install the update manually:");
        eprintln!("  {}", command.bold());
        eprintln!("(the command has been copied to the clipboard if one is available)");
    }
}

pub fn print_info(verbosity: Verbosity, msg: &str) {
    if verbosity != Verbosity::Quiet {
        println!("{} {}", "info:".bold(), msg);
    }
}

fn header(name: &str) -> Cell {
    Cell::new(name).add_attribute(Attribute::Bold)
}

fn right(value: &str) -> Cell {
    Cell::new(value).set_alignment(CellAlignment::Right)
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(headers.iter().map(|h| header(h)).collect::<Vec<_>>());
    table
}

/// Version plus build time when known.
pub fn format_version(version: &Version, verbose: bool) -> String {
    if version.is_development_version() {
        return "development".to_string();
    }
    version.to_string_with(verbose)
}

pub fn print_check(current: &Version, channel: &str, newest: Option<&UpdateVersion>, verbosity: Verbosity) {
    let verbose = verbosity == Verbosity::Verbose;
    match newest {
        Some(update) => {
            if verbosity == Verbosity::Quiet {
                println!("{}", update.version.to_string_with(false));
                return;
            }
            println!(
                "{} {} → {} on channel {channel}",
                "update available:".bold().green(),
                format_version(current, verbose),
                format_version(&update.version, verbose).bold()
            );
        }
        None => {
            if verbosity != Verbosity::Quiet {
                println!("client {} is up to date on channel {channel}", format_version(current, verbose));
            }
        }
    }
}

/// One row per channel with its newest build for this platform.
pub fn print_channels_table(rows: &[(String, Option<UpdateVersion>)], selected: &str, verbosity: Verbosity) {
    let verbose = verbosity == Verbosity::Verbose;
    let headers: &[&str] = if verbose {
        &["CHANNEL", "NEWEST", "PLATFORM", "ARCH", ""]
    } else {
        &["CHANNEL", "NEWEST", ""]
    };
    let mut table = new_table(headers);

    for (channel, newest) in rows {
        let version = newest
            .as_ref()
            .map(|v| v.version.to_string_with(verbose))
            .unwrap_or_else(|| "-".to_string());
        let marker = if channel == selected { "selected" } else { "" };

        let mut row = vec![Cell::new(channel), right(&version)];
        if verbose {
            row.push(Cell::new(newest.as_ref().map_or("-", |v| v.platform.as_str())));
            row.push(Cell::new(newest.as_ref().map_or("-", |v| v.arch.as_str())));
        }
        row.push(Cell::new(marker));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn print_prepared(prepared: &PreparedUpdate, size: Option<u64>, verbosity: Verbosity) {
    if verbosity == Verbosity::Quiet {
        return;
    }

    let mut table = new_table(&["", ""]);
    table.add_row(vec![header("version"), Cell::new(prepared.version.version.to_string_with(false))]);
    table.add_row(vec![
        header("download"),
        Cell::new(size.map_or_else(|| "-".to_string(), |b| ByteSize(b).to_string())),
    ]);
    table.add_row(vec![header("install root"), Cell::new(prepared.install_root.display())]);
    table.add_row(vec![header("files"), Cell::new(prepared.plan.moves.len())]);
    if verbosity == Verbosity::Verbose {
        table.add_row(vec![header("plan"), Cell::new(prepared.plan_file.display())]);
        table.add_row(vec![header("log"), Cell::new(prepared.log_file.display())]);
    }
    println!("{table}");

    if !prepared.inaccessible_paths.is_empty() {
        println!();
        println!("{}", "missing write permissions:".bold().yellow());
        for path in &prepared.inaccessible_paths {
            println!("  {path}");
        }
    }
}

pub fn print_handoff(report: &HandoffReport) {
    if report.success {
        println!("{}", "update succeeded".bold().green());
    } else {
        println!("{}", "update failed".bold().red());
    }

    if !report.parsed {
        println!("(the installer report could not be decoded)");
        return;
    }
    if let Some(id) = &report.error_id {
        println!("error id: {id}");
    }
    if let Some(message) = &report.error_message {
        println!("error: {message}");
    }
    if let Some(log_file) = &report.log_file {
        println!("log file: {log_file}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_versions_are_named() {
        assert_eq!(format_version(&Version::default(), false), "development");
        assert_eq!(format_version(&Version::parse("1.5.0-2 [1600]"), false), "1.5.0-2");
        assert_eq!(format_version(&Version::parse("1.5.0-2 [1600]"), true), "1.5.0-2 [1600]");
    }

    #[test]
    fn json_error_carries_code() {
        let output: JsonOutput<()> = JsonOutput::err(&Error::SourceNotUpdatable);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "source-not-updatable");
        assert!(json.get("data").is_none());
    }
}
