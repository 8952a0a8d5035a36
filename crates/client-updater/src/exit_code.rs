// SPDX-License-Identifier: MIT OR Apache-2.0

use libclient_updater::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    RecoverableFailure = 1,
    FatalError = 2,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<&Error> for ExitCode {
    /// Failures the operator can fix and retry are recoverable; the rest are fatal.
    fn from(error: &Error) -> Self {
        if matches!(error, Error::PermissionDenied { .. }) || error.is_transient() {
            Self::RecoverableFailure
        } else {
            Self::FatalError
        }
    }
}
