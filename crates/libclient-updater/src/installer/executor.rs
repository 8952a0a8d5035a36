// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fmt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use parking_lot::MutexGuard;

use crate::{
    Error, Result, UpdatePipeline, paths,
    types::{InstallPlan, UpdateVersion},
};

use super::{
    download::{self, Encoding},
    extract,
    host::HostHooks,
    plan, preflight, privilege,
};

const INSTALL_LOG_FILE: &str = "update-log.txt";
const INSTALL_PLAN_FILE: &str = "update_install.json";
const UPDATE_DIR_PREFIX: &str = "teaclient_update_";

/// Progress of an update session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Downloading,
    Extracting,
    BuildingPlan,
    ReadyToInstall,
    Installing,
    Done,
    Failed { code: &'static str, message: String },
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Downloading => f.write_str("downloading update"),
            Self::Extracting => f.write_str("extracting update"),
            Self::BuildingPlan => f.write_str("generating install config"),
            Self::ReadyToInstall => f.write_str("update successfully prepared"),
            Self::Installing => f.write_str("installing"),
            Self::Done => f.write_str("done"),
            Self::Failed { code, message } => write!(f, "failed ({code}): {message}"),
        }
    }
}

/// Everything the installer needs, produced by [`UpdateSession::prepare`].
#[derive(Debug, Clone)]
pub struct PreparedUpdate {
    pub version: UpdateVersion,
    pub install_root: PathBuf,
    pub update_file: PathBuf,
    pub source_dir: PathBuf,
    pub installer: PathBuf,
    pub log_file: PathBuf,
    pub plan_file: PathBuf,
    pub plan: InstallPlan,
    /// Paths the preflight could not write. Empty where no preflight runs.
    pub inaccessible_paths: Vec<String>,
}

impl PreparedUpdate {
    /// The command that installs this update with elevated privileges.
    pub fn sudo_command(&self) -> String {
        privilege::sudo_command_line(&self.installer, &self.log_file, &self.plan_file)
    }
}

/// Platform-specific handoff to the external installer.
pub trait InstallStrategy {
    fn install(&self, prepared: &PreparedUpdate, host: &dyn HostHooks) -> Result<()>;

    /// Whether the write preflight decides how this strategy proceeds.
    fn uses_preflight(&self) -> bool;
}

/// Runs the installer synchronously, then terminates the application.
///
/// Refuses to run anything when the preflight found paths it cannot write.
/// The operator gets a sudo command instead, also placed on the clipboard.
pub struct UnixInstaller {
    pub process_name: String,
}

/// Spawns the installer detached and quits right away.
pub struct WindowsInstaller {
    pub working_dir: PathBuf,
}

impl InstallStrategy for UnixInstaller {
    fn install(&self, prepared: &PreparedUpdate, host: &dyn HostHooks) -> Result<()> {
        if !prepared.inaccessible_paths.is_empty() {
            let command = prepared.sudo_command();
            if let Err(e) = host.copy_to_clipboard(&command) {
                log::error!(target: "install", "failed to copy command to clipboard: {e}");
            }
            log::error!(target: "install", "missing write permissions, run manually: {command}");
            return Err(Error::PermissionDenied {
                command,
                inaccessible: prepared.inaccessible_paths.clone(),
            });
        }

        log::info!(target: "install", "executing {} with {} and {}",
            prepared.installer.display(), prepared.log_file.display(), prepared.plan_file.display());
        let status = Command::new(&prepared.installer)
            .arg(&prepared.log_file)
            .arg(&prepared.plan_file)
            .status()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    Error::installer("failed to execute update installer (no permissions)")
                }
                _ => Error::installer(format!("failed to execute update installer: {e}")),
            })?;

        if !status.success() {
            let code = status.code().map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(Error::installer(format!("installer exited with code {code}")));
        }

        host.release_single_instance_lock();
        let killed = privilege::kill_processes_named(&self.process_name);
        log::debug!(target: "install", "terminated {killed} other {} processes", self.process_name);
        host.quit();
        Ok(())
    }

    fn uses_preflight(&self) -> bool {
        true
    }
}

impl InstallStrategy for WindowsInstaller {
    fn install(&self, prepared: &PreparedUpdate, host: &dyn HostHooks) -> Result<()> {
        log::info!(target: "install", "spawning {} detached", prepared.installer.display());

        let mut command = Command::new(&prepared.installer);
        command
            .arg(&prepared.log_file)
            .arg(&prepared.plan_file)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;

            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        // The child is never waited on; it outlives this process.
        let child = command
            .spawn()
            .map_err(|e| Error::installer(format!("invoking the update installer failed: {e}")))?;
        drop(child);

        host.quit();
        Ok(())
    }

    fn uses_preflight(&self) -> bool {
        false
    }
}

/// Picks the strategy for the running platform.
pub fn platform_strategy(pipeline: &UpdatePipeline) -> Box<dyn InstallStrategy> {
    if cfg!(windows) {
        let working_dir = pipeline
            .install_root()
            .unwrap_or_else(|_| pipeline.config().executable_path().parent().map(Path::to_path_buf).unwrap_or_default());
        Box::new(WindowsInstaller { working_dir })
    } else {
        Box::new(UnixInstaller {
            process_name: pipeline.config().process_name(),
        })
    }
}

/// One client update from download to installer handoff.
///
/// Only one session exists per pipeline at a time; see
/// [`UpdatePipeline::begin_update`].
pub struct UpdateSession<'p> {
    pipeline: &'p UpdatePipeline,
    _guard: MutexGuard<'p, ()>,
    strategy: Box<dyn InstallStrategy>,
    state: UpdateState,
    prepared: Option<PreparedUpdate>,
}

impl<'p> UpdateSession<'p> {
    pub(crate) fn new(
        pipeline: &'p UpdatePipeline,
        guard: MutexGuard<'p, ()>,
        strategy: Box<dyn InstallStrategy>,
    ) -> Self {
        Self {
            pipeline,
            _guard: guard,
            strategy,
            state: UpdateState::Idle,
            prepared: None,
        }
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn prepared(&self) -> Option<&PreparedUpdate> {
        self.prepared.as_ref()
    }

    /// Downloads, extracts and plans `target`, stopping at [`UpdateState::ReadyToInstall`].
    ///
    /// `on_status` receives a human readable stage and a progress in `[0, 1]`.
    pub fn prepare(
        &mut self,
        target: &UpdateVersion,
        on_status: &mut dyn FnMut(&str, f64),
    ) -> Result<&PreparedUpdate> {
        if self.state != UpdateState::Idle {
            return Err(Error::invalid_state(format!("cannot prepare an update while {}", self.state)));
        }

        match self.run_prepare(target, on_status) {
            Ok(prepared) => {
                self.state = UpdateState::ReadyToInstall;
                on_status("Update successfully prepared", 1.0);
                Ok(self.prepared.insert(prepared))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Hands off to the installer. Only valid in [`UpdateState::ReadyToInstall`].
    pub fn execute(&mut self) -> Result<()> {
        if self.state != UpdateState::ReadyToInstall {
            return Err(Error::invalid_state(format!("cannot install while {}", self.state)));
        }
        let Some(prepared) = self.prepared.as_ref() else {
            return Err(Error::invalid_state("no prepared update"));
        };

        self.state = UpdateState::Installing;
        // The installer reads the update directory after this process is gone.
        self.pipeline.release_temp_dir(&prepared.source_dir);

        match self.strategy.install(prepared, self.pipeline.host()) {
            Ok(()) => {
                self.state = UpdateState::Done;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        log::error!(target: "install", "update failed: {error}");
        self.state = UpdateState::Failed {
            code: error.code(),
            message: error.to_string(),
        };
        error
    }

    fn run_prepare(
        &mut self,
        target: &UpdateVersion,
        on_status: &mut dyn FnMut(&str, f64),
    ) -> Result<PreparedUpdate> {
        let pipeline = self.pipeline;
        let config = pipeline.config();
        let install_root = pipeline.install_root()?;

        self.state = UpdateState::Downloading;
        on_status("Downloading update", 0.0);
        let update_file = config
            .app_versions_dir()
            .join(paths::update_file_name(&target.channel, &target.version));
        log::info!(target: "install", "downloading version {} to {}",
            target.version.to_string_with(false), update_file.display());

        let remote = pipeline.remote();
        download::download(
            remote.update_download_client(),
            remote.client_download_url(target),
            &update_file,
            Encoding::Gzip,
            &mut |progress| on_status("Downloading update", progress.percent),
        )?;

        self.state = UpdateState::Extracting;
        on_status("Extracting update", 0.5);
        let update_dir = tempfile::Builder::new()
            .prefix(UPDATE_DIR_PREFIX)
            .tempdir_in(config.temp_dir())
            .map_err(|e| Error::extraction(format!("failed to create update source directory: {e}")))?;
        let source_dir = pipeline.register_temp_dir(update_dir);
        let extracted = extract::extract_update(&update_file, &source_dir)?;
        log::debug!(target: "install", "extracted {} entries to {}", extracted.entries, source_dir.display());

        self.state = UpdateState::BuildingPlan;
        on_status("Generating install config", 0.5);
        let executable = config.executable_path();
        let plan = plan::build_install_plan(&source_dir, &install_root, &executable)?;
        let log_file = source_dir.join(INSTALL_LOG_FILE);
        let plan_file = source_dir.join(INSTALL_PLAN_FILE);
        plan::write_install_plan(&plan, &plan_file)?;

        let inaccessible_paths = if self.strategy.uses_preflight() {
            let inaccessible = preflight::check_update_file(&update_file, &install_root)?;
            privilege::make_executable(&extracted.installer)?;
            inaccessible
        } else {
            Vec::new()
        };

        Ok(PreparedUpdate {
            version: target.clone(),
            install_root,
            update_file,
            source_dir,
            installer: extracted.installer,
            log_file,
            plan_file,
            plan,
            inaccessible_paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use super::*;
    use crate::{
        Config,
        api::ApiConfig,
        installer::host::{HostHooks, fake::RecordingHost},
        test_support::{self, TestServer, gzip, tar_archive},
        version::Version,
    };

    struct SharedHost(Arc<RecordingHost>);

    impl HostHooks for SharedHost {
        fn release_single_instance_lock(&self) {
            self.0.release_single_instance_lock();
        }
        fn copy_to_clipboard(&self, text: &str) -> Result<()> {
            self.0.copy_to_clipboard(text)
        }
        fn quit(&self) {
            self.0.quit();
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        config: Config,
    }

    fn fixture(server_url: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("install");
        fs::create_dir_all(root.join("resources")).unwrap();
        fs::write(root.join("resources/app.asar"), b"old").unwrap();
        fs::write(root.join("TeaClient"), b"old").unwrap();
        fs::write(
            root.join("app-info.json"),
            r#"{"version":2,"clientVersion":{"major":1,"minor":4,"patch":0,"buildIndex":0,"timestamp":0},"uiPackChannel":"release","clientChannel":"release"}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();

        let config = Config::new()
            .with_server_url(server_url)
            .with_data_dir(dir.path().join("data"))
            .with_temp_dir(dir.path().join("tmp"))
            .with_resource_path(root.join("resources/app.asar"))
            .with_executable_path(root.join("TeaClient"))
            .with_process_name("client-updater-test-no-such-process");
        Fixture {
            root: fs::canonicalize(&root).unwrap(),
            _dir: dir,
            config,
        }
    }

    fn target() -> UpdateVersion {
        UpdateVersion {
            channel: "release".to_string(),
            platform: paths::platform_identifier().to_string(),
            arch: paths::arch_identifier().to_string(),
            version: Version::parse("1.5.0"),
        }
    }

    fn update_package(installer_exit: u8) -> Vec<u8> {
        let script = format!("#!/bin/sh\nexit {installer_exit}\n");
        gzip(&tar_archive(&[
            ("TeaClient", b"new binary"),
            ("resources/app.asar", b"new asar"),
            ("update-installer", script.as_bytes()),
        ]))
    }

    fn pipeline(fixture: &Fixture, host: Arc<RecordingHost>) -> UpdatePipeline {
        UpdatePipeline::with_host(fixture.config.clone(), ApiConfig::new(), Box::new(SharedHost(host))).unwrap()
    }

    #[test]
    fn prepare_reaches_ready_to_install() {
        let server = TestServer::fixed(200, update_package(0));
        let fixture = fixture(server.url());
        let pipeline = pipeline(&fixture, Arc::default());
        let mut session = pipeline.begin_update().unwrap();

        let mut stages = Vec::new();
        let prepared = session.prepare(&target(), &mut |stage, _| stages.push(stage.to_string())).unwrap();

        assert!(prepared.update_file.ends_with("app_versions/release_1_5_0_0.tar"));
        assert!(prepared.installer.is_file());
        assert!(prepared.plan_file.is_file());
        assert_eq!(prepared.install_root, fixture.root);
        assert!(prepared.source_dir.file_name().unwrap().to_string_lossy().starts_with(UPDATE_DIR_PREFIX));
        assert_eq!(prepared.plan.moves.len(), 2);
        assert_eq!(prepared.plan.moves[0].target_path, fixture.root.join("TeaClient"));
        assert!(prepared.inaccessible_paths.is_empty() || test_support::is_root() || cfg!(windows));
        assert_eq!(session.state(), &UpdateState::ReadyToInstall);
        assert!(stages.contains(&"Extracting update".to_string()));
    }

    #[test]
    fn second_session_is_refused() {
        let fixture = fixture("http://127.0.0.1:9/");
        let pipeline = pipeline(&fixture, Arc::default());
        let _session = pipeline.begin_update().unwrap();
        let Err(err) = pipeline.begin_update() else {
            panic!("second session started");
        };
        assert_eq!(err.code(), "update-in-progress");
    }

    #[test]
    fn unpackaged_source_fails_fast() {
        let server = TestServer::fixed(200, update_package(0));
        let mut fixture = fixture(server.url());
        fixture.config.resource_path = Some(fixture.root.join("app"));
        let pipeline = pipeline(&fixture, Arc::default());
        let mut session = pipeline.begin_update().unwrap();

        let err = session.prepare(&target(), &mut |_, _| {}).unwrap_err();

        assert_eq!(err.code(), "source-not-updatable");
        assert_eq!(server.hits(), 0);
        assert!(matches!(session.state(), UpdateState::Failed { code: "source-not-updatable", .. }));
    }

    #[test]
    fn download_failure_moves_to_failed() {
        let server = TestServer::fixed(500, "nope");
        let fixture = fixture(server.url());
        let pipeline = pipeline(&fixture, Arc::default());
        let mut session = pipeline.begin_update().unwrap();

        let err = session.prepare(&target(), &mut |_, _| {}).unwrap_err();
        assert_eq!(err.code(), "download-failed");
        assert!(session.execute().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn unix_install_runs_installer_and_quits() {
        let server = TestServer::fixed(200, update_package(0));
        let fixture = fixture(server.url());
        let host = Arc::new(RecordingHost::default());
        let pipeline = pipeline(&fixture, Arc::clone(&host));
        let mut session = pipeline.begin_update().unwrap();
        session.prepare(&target(), &mut |_, _| {}).unwrap();
        if let Some(prepared) = session.prepared.as_mut() {
            prepared.inaccessible_paths.clear();
        }

        session.execute().unwrap();

        assert_eq!(session.state(), &UpdateState::Done);
        assert_eq!(*host.calls.lock(), vec!["release-lock", "quit"]);
        let source_dir = session.prepared().unwrap().source_dir.clone();
        drop(session);
        drop(pipeline);
        assert!(source_dir.exists(), "update directory must survive for the installer");
        fs::remove_dir_all(source_dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn unix_install_reports_installer_exit_code() {
        let server = TestServer::fixed(200, update_package(3));
        let fixture = fixture(server.url());
        let host = Arc::new(RecordingHost::default());
        let pipeline = pipeline(&fixture, Arc::clone(&host));
        let mut session = pipeline.begin_update().unwrap();
        session.prepare(&target(), &mut |_, _| {}).unwrap();
        if let Some(prepared) = session.prepared.as_mut() {
            prepared.inaccessible_paths.clear();
        }

        let err = session.execute().unwrap_err();
        assert_eq!(err.code(), "installer-failed");
        assert!(err.to_string().contains("code 3"));
        assert!(host.calls.lock().is_empty());
    }

    #[test]
    fn inaccessible_paths_yield_sudo_command() {
        let server = TestServer::fixed(200, update_package(0));
        let fixture = fixture(server.url());
        let host = Arc::new(RecordingHost::default());
        let pipeline = pipeline(&fixture, Arc::clone(&host));
        let mut session = pipeline.begin_update().unwrap();
        session.strategy = Box::new(UnixInstaller {
            process_name: "client-updater-test-no-such-process".to_string(),
        });
        session.prepare(&target(), &mut |_, _| {}).unwrap();
        if let Some(prepared) = session.prepared.as_mut() {
            prepared.inaccessible_paths = vec!["failed to acquire write permissions for file x".to_string()];
        }

        let err = session.execute().unwrap_err();

        assert_eq!(err.code(), "permission-denied");
        let command = err.remediation().unwrap().to_string();
        assert!(command.starts_with("sudo \""));
        assert!(command.ends_with("update_install.json\" no-daemon"));
        assert_eq!(host.clipboard.lock().as_deref(), Some(command.as_str()));
        assert!(!host.calls.lock().contains(&"quit".to_string()));
        assert!(matches!(session.state(), UpdateState::Failed { code: "permission-denied", .. }));
    }
}
