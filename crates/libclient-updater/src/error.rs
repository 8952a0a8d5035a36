// SPDX-License-Identifier: MIT OR Apache-2.0

/// Errors raised by the update pipeline.
///
/// Every variant maps to a short, stable code (see [`Error::code`]) which is
/// what operator-facing surfaces should show and match on.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("remote server unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("remote server returned {0}")]
    RemoteBadStatus(String),

    #[error("invalid response from remote server: {0}")]
    RemoteBadBody(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("disk write error: {0}")]
    DiskWrite(String),

    #[error("extraction failed: {0}")]
    ExtractFailed(String),

    #[error("missing update installer executable within update package")]
    MissingInstallerExecutable,

    #[error("failed to build install plan: {0}")]
    PlanBuildFailed(String),

    #[error("missing write permissions for {} path(s), run: {command}", inaccessible.len())]
    PermissionDenied {
        command: String,
        inaccessible: Vec<String>,
    },

    #[error("the source can't be updated")]
    SourceNotUpdatable,

    #[error("no ui pack available: {0}")]
    NoUiPackAvailable(String),

    #[error("invalid file contents: {0}")]
    Schema(String),

    #[error("another update session is already running")]
    UpdateInProgress,

    #[error("update installer failed: {0}")]
    InstallerFailed(String),

    #[error("invalid update state: {0}")]
    InvalidState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

macro_rules! error_ctor {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(msg: impl Into<String>) -> Self {
                Self::$variant(msg.into())
            }
        )*
    };
}

impl Error {
    error_ctor!(
        unreachable => RemoteUnreachable,
        bad_status => RemoteBadStatus,
        bad_body => RemoteBadBody,
        download => DownloadFailed,
        disk_write => DiskWrite,
        extraction => ExtractFailed,
        plan => PlanBuildFailed,
        no_ui_pack => NoUiPackAvailable,
        schema => Schema,
        installer => InstallerFailed,
        invalid_state => InvalidState,
    );

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Stable machine id for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RemoteUnreachable(_) => "remote-unreachable",
            Self::RemoteBadStatus(_) => "remote-bad-status",
            Self::RemoteBadBody(_) => "remote-bad-body",
            Self::DownloadFailed(_) => "download-failed",
            Self::DiskWrite(_) => "disk-write-error",
            Self::ExtractFailed(_) => "extract-failed",
            Self::MissingInstallerExecutable => "missing-installer-executable",
            Self::PlanBuildFailed(_) => "plan-build-failed",
            Self::PermissionDenied { .. } => "permission-denied",
            Self::SourceNotUpdatable => "source-not-updatable",
            Self::NoUiPackAvailable(_) => "no-ui-pack-available",
            Self::Schema(_) => "schema-invalid",
            Self::UpdateInProgress => "update-in-progress",
            Self::InstallerFailed(_) => "installer-failed",
            Self::InvalidState(_) => "invalid-state",
            Self::Io(_) => "io-error",
            Self::Other(_) => "other",
        }
    }

    /// Errors that must never be retried automatically.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SourceNotUpdatable | Self::MissingInstallerExecutable | Self::NoUiPackAvailable(_)
        )
    }

    /// Network-side failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnreachable(_)
                | Self::RemoteBadStatus(_)
                | Self::DownloadFailed(_)
                | Self::UpdateInProgress
        )
    }

    /// A command the operator can run to finish the operation by hand.
    pub fn remediation(&self) -> Option<&str> {
        match self {
            Self::PermissionDenied { command, .. } => Some(command),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            Self::RemoteBadStatus(status.to_string())
        } else {
            Self::RemoteUnreachable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Schema(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
