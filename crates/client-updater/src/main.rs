// SPDX-License-Identifier: MIT OR Apache-2.0

mod cli_config;
mod exit_code;
mod logger;
mod output;
mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use inquire::InquireError;
use is_terminal::IsTerminal;
use serde::Serialize;

use cli_config::{CliConfig, Overrides};
use exit_code::ExitCode;
use libclient_updater::{
    Error, FetchMode, HandoffReport, LoadedUiPack, Result, UiLoadMethod, UpdatePipeline, UpdateVersion,
    arch_identifier, platform_identifier,
};
use output::Verbosity;
use progress::StageBar;

#[derive(Parser)]
#[command(name = "client-updater")]
#[command(about = "check, download and install client updates and ui packs")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, global = true, help = "update server url")]
    server_url: Option<String>,

    #[arg(long, global = true, help = "directory for downloads, caches and settings")]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "packaged resource archive of the client (<root>/resources/app.asar)")]
    resource_path: Option<PathBuf>,

    #[arg(long, global = true, help = "client executable being updated (defaults to this binary)")]
    executable_path: Option<PathBuf>,

    #[arg(long, global = true, help = "process name terminated before installing")]
    process_name: Option<String>,

    #[arg(long = "updater-local-version", global = true, help = "pretend to run this client version")]
    local_version: Option<String>,

    #[arg(long, global = true, help = "accept ui packs requiring a newer client")]
    debug: bool,

    #[arg(long, global = true, help = "print results as json")]
    json: bool,

    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long, global = true)]
    quiet: bool,

    #[arg(long, hide = true)]
    update_failed_new: Option<String>,

    #[arg(long, hide = true)]
    update_succeed_new: Option<String>,

    #[arg(long, hide = true)]
    no_single_instance: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "check whether a client update is available")]
    Check {
        #[arg(long, help = "channel to check instead of the selected one")]
        channel: Option<String>,
    },
    #[command(about = "list remote channels and their newest builds")]
    Channels {
        #[arg(long, help = "make this the selected update channel")]
        select: Option<String>,
    },
    #[command(about = "download, prepare and install a client update")]
    Update {
        #[arg(long, help = "channel to update from instead of the selected one")]
        channel: Option<String>,
        #[arg(short = 'y', long, help = "install without asking")]
        yes: bool,
    },
    #[command(about = "load the ui pack and print where it was unpacked")]
    LoadUi {
        #[arg(long, help = "pack, bundled or dev")]
        method: Option<String>,
        #[arg(long, help = "ignore cached ui packs")]
        no_cache: bool,
        #[arg(long, help = "ui pack channel")]
        channel: Option<String>,
        #[arg(long, help = "keep the unpacked files after exiting")]
        keep: bool,
    },
    #[command(about = "decode an installer callback argument")]
    Handoff {
        #[arg(allow_hyphen_values = true, help = "--update-succeed-new=<payload> or --update-failed-new=<payload>")]
        argument: String,
    },
}

struct Context {
    file: CliConfig,
    overrides: Overrides,
    verbosity: Verbosity,
    json: bool,
}

impl Context {
    fn pipeline(&self, config: libclient_updater::Config) -> Result<UpdatePipeline> {
        UpdatePipeline::new(config)
    }

    fn config(&self) -> libclient_updater::Config {
        self.file.to_library_config(&self.overrides)
    }

    /// Explicit flag, then config file, then the persisted selection.
    fn channel(&self, flag: Option<&String>, pipeline: &UpdatePipeline) -> String {
        flag.or(self.file.channel.as_ref())
            .cloned()
            .unwrap_or_else(|| pipeline.selected_channel())
    }

    fn hide_progress(&self) -> bool {
        self.json || self.verbosity == Verbosity::Quiet
    }
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let exit_code = run(cli).unwrap_or_else(|e| {
        output::output_error(json, &e);
        ExitCode::from(&e)
    });

    std::process::exit(exit_code.into());
}

fn run(cli: Cli) -> Result<ExitCode> {
    let file = CliConfig::load()?;
    let verbosity = if cli.verbose {
        Verbosity::Verbose
    } else if cli.quiet {
        Verbosity::Quiet
    } else {
        file.verbosity
    };
    logger::init(verbosity, std::io::stderr().is_terminal());

    let ctx = Context {
        overrides: Overrides {
            server_url: cli.server_url.clone(),
            data_dir: cli.data_dir.clone(),
            resource_path: cli.resource_path.clone(),
            executable_path: cli.executable_path.clone(),
            process_name: cli.process_name.clone(),
            local_version: cli.local_version.clone(),
            debug: cli.debug,
        },
        file,
        verbosity,
        json: cli.json,
    };

    if let Some(payload) = &cli.update_succeed_new {
        return do_handoff(&ctx, HandoffReport::decode(true, payload));
    }
    if let Some(payload) = &cli.update_failed_new {
        return do_handoff(&ctx, HandoffReport::decode(false, payload));
    }

    match &cli.command {
        None => do_check(&ctx, None),
        Some(Commands::Check { channel }) => do_check(&ctx, channel.as_ref()),
        Some(Commands::Channels { select }) => do_channels(&ctx, select.as_deref()),
        Some(Commands::Update { channel, yes }) => do_update(&ctx, channel.as_ref(), *yes),
        Some(Commands::LoadUi {
            method,
            no_cache,
            channel,
            keep,
        }) => do_load_ui(&ctx, method.as_deref(), *no_cache, channel.clone(), *keep),
        Some(Commands::Handoff { argument }) => {
            let report = HandoffReport::from_args([argument])
                .ok_or_else(|| Error::other(format!("'{argument}' is not an installer callback argument")))?;
            do_handoff(&ctx, report)
        }
    }
}

#[derive(Serialize)]
struct CheckData {
    current_version: String,
    channel: String,
    update_available: bool,
    update: Option<UpdateVersion>,
}

fn do_check(ctx: &Context, channel: Option<&String>) -> Result<ExitCode> {
    let pipeline = ctx.pipeline(ctx.config())?;
    let channel = ctx.channel(channel, &pipeline);
    let current = pipeline.current_client_version();

    let spinner = progress::create_fetch_spinner("Fetching update information", ctx.hide_progress());
    let update = pipeline
        .remote()
        .fetch_update_catalog_with(FetchMode::Interactive)
        .and_then(|_| pipeline.available_client_update_on(&channel));
    spinner.finish_and_clear();
    let update = update?;

    if ctx.json {
        return output::output_json(CheckData {
            current_version: current.to_string_with(false),
            channel,
            update_available: update.is_some(),
            update,
        });
    }

    output::print_check(&current, &channel, update.as_ref(), ctx.verbosity);
    Ok(ExitCode::Success)
}

#[derive(Serialize)]
struct ChannelRow {
    channel: String,
    newest: Option<UpdateVersion>,
    selected: bool,
}

fn do_channels(ctx: &Context, select: Option<&str>) -> Result<ExitCode> {
    let pipeline = ctx.pipeline(ctx.config())?;

    let spinner = progress::create_fetch_spinner("Fetching update information", ctx.hide_progress());
    let catalog = pipeline.remote().fetch_update_catalog_with(FetchMode::Interactive);
    spinner.finish_and_clear();
    let catalog = catalog?;

    let channels = catalog.channels();
    if let Some(channel) = select {
        if !channels.iter().any(|c| c == channel) {
            log::warn!(target: "settings", "channel {channel} is not published by the server");
        }
        pipeline.set_selected_channel(channel);
    }
    let selected = pipeline.selected_channel();

    let rows: Vec<(String, Option<UpdateVersion>)> = channels
        .into_iter()
        .map(|channel| {
            let newest = catalog
                .newest_version_for(&channel, platform_identifier(), arch_identifier())
                .cloned();
            (channel, newest)
        })
        .collect();

    if ctx.json {
        let rows: Vec<ChannelRow> = rows
            .into_iter()
            .map(|(channel, newest)| ChannelRow {
                selected: channel == selected,
                channel,
                newest,
            })
            .collect();
        return output::output_json(rows);
    }

    output::print_channels_table(&rows, &selected, ctx.verbosity);
    Ok(ExitCode::Success)
}

fn do_update(ctx: &Context, channel: Option<&String>, yes: bool) -> Result<ExitCode> {
    let pipeline = ctx.pipeline(ctx.config())?;
    let channel = ctx.channel(channel, &pipeline);

    let spinner = progress::create_fetch_spinner("Fetching update information", ctx.hide_progress());
    let target = pipeline
        .remote()
        .fetch_update_catalog_with(FetchMode::Interactive)
        .and_then(|_| pipeline.available_client_update_on(&channel));
    spinner.finish_and_clear();

    let Some(target) = target? else {
        output::print_info(ctx.verbosity, &format!("no update available on channel {channel}"));
        return Ok(ExitCode::Success);
    };
    output::print_info(
        ctx.verbosity,
        &format!("updating to {} from channel {channel}", target.version.to_string_with(false)),
    );

    let mut session = pipeline.begin_update()?;
    let bar = StageBar::new(ctx.hide_progress());
    let prepared = session.prepare(&target, &mut |stage, progress| bar.update(stage, progress));
    bar.finish();
    let prepared = prepared?;

    let size = std::fs::metadata(&prepared.update_file).ok().map(|m| m.len());
    output::print_prepared(prepared, size, ctx.verbosity);

    if !(yes || ctx.file.assume_yes) && !confirm_install()? {
        output::print_info(ctx.verbosity, "update prepared but not installed");
        return Ok(ExitCode::Success);
    }

    // On success the host quits this process.
    session.execute()?;
    Ok(ExitCode::Success)
}

fn confirm_install() -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        println!("run with --yes to install the prepared update");
        return Ok(false);
    }

    match inquire::Confirm::new("Install the update now? The client will be closed.")
        .with_default(false)
        .prompt()
    {
        Ok(answer) => Ok(answer),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
        Err(e) => Err(Error::other(format!("prompt failed: {e}"))),
    }
}

#[derive(Serialize)]
struct LoadUiData {
    entry: String,
    root: Option<PathBuf>,
    bundled: bool,
    timestamp: Option<u64>,
    kept: bool,
}

fn do_load_ui(
    ctx: &Context,
    method: Option<&str>,
    no_cache: bool,
    channel: Option<String>,
    keep: bool,
) -> Result<ExitCode> {
    let mut config = ctx.config().with_ui_no_cache(no_cache);
    if let Some(method) = method {
        config = config.with_ui_load_method(method.parse::<UiLoadMethod>()?);
    }
    if let Some(channel) = channel {
        config = config.with_ui_channel(channel);
    }
    let pipeline = ctx.pipeline(config)?;

    let bar = StageBar::new(ctx.hide_progress());
    let loaded = pipeline.load_ui_pack(&mut |stage, progress| bar.update(stage, progress));
    bar.finish();
    let loaded = loaded?;

    let kept = keep && pipeline.keep_ui_pack(&loaded).is_some();
    let (root, bundled, timestamp) = match &loaded {
        LoadedUiPack::Unpacked { root, pack, bundled } => {
            (Some(root.clone()), *bundled, Some(pack.pack_info.timestamp_millis))
        }
        LoadedUiPack::DevServer { .. } => (None, false, None),
    };

    if ctx.json {
        return output::output_json(LoadUiData {
            entry: loaded.entry_url(),
            root,
            bundled,
            timestamp,
            kept,
        });
    }

    if ctx.verbosity != Verbosity::Quiet {
        let source = if bundled { "bundled ui pack" } else { "ui pack" };
        match &root {
            Some(root) => println!("{source} unpacked to {}", root.display()),
            None => println!("ui served from {}", loaded.entry_url()),
        }
        if root.is_some() && !kept {
            println!("(removed on exit, pass --keep to keep it)");
        }
    } else {
        println!("{}", loaded.entry_url());
    }
    Ok(ExitCode::Success)
}

fn do_handoff(ctx: &Context, report: HandoffReport) -> Result<ExitCode> {
    let code = if report.success {
        ExitCode::Success
    } else {
        ExitCode::RecoverableFailure
    };

    if ctx.json {
        output::output_json(&report)?;
    } else {
        output::print_handoff(&report);
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn installer_callback_is_accepted_at_top_level() {
        let cli = Cli::try_parse_from(["client-updater", "--no-single-instance", "--update-failed-new=abc"]).unwrap();
        assert_eq!(cli.update_failed_new.as_deref(), Some("abc"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn client_executable_flags_reach_overrides() {
        let cli = Cli::try_parse_from([
            "client-updater",
            "update",
            "--executable-path",
            "/opt/client/TeaClient",
            "--process-name",
            "TeaClient",
        ])
        .unwrap();
        assert_eq!(cli.executable_path, Some(PathBuf::from("/opt/client/TeaClient")));
        assert_eq!(cli.process_name.as_deref(), Some("TeaClient"));
    }

    #[test]
    fn handoff_takes_hyphenated_argument() {
        let cli = Cli::try_parse_from(["client-updater", "handoff", "--update-succeed-new=abc"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Handoff { argument }) if argument == "--update-succeed-new=abc"));
    }
}
