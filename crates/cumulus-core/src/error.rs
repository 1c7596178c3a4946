//! Two-level error taxonomy shared by the VFS and comm layers.
//!
//! Every fallible operation returns an [`ExitInfo`] carrying a coarse
//! [`ExitCode`] and a narrowing [`ExitCause`]. Callers branch on both
//! fields: retry on `NetworkError`/`NetworkTimeout`, surface to the user
//! on `SystemError`/`FileAccessError`, blacklist-and-continue on
//! `DataError`/`FileExists`, and so on. Expected failures (missing file,
//! access denied, timeout) are always values, never panics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitCode {
    Ok,
    Unknown,
    NetworkError,
    /// Corruption of data
    DataError,
    /// Error in a local database function
    DbError,
    /// I/O error, permission failure, etc.
    SystemError,
    FatalError,
    /// Violated precondition or invariant within the program
    LogicError,
    /// The sync configuration is not valid
    InvalidSync,
    InvalidOperation,
    OperationCanceled,
}

/// Narrow failure reason within an [`ExitCode`] category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitCause {
    Unknown,
    NotFound,
    FileAccessError,
    FileExists,
    FileLocked,
    NotPlaceHolder,
    InvalidArgument,
    NotEnoughDiskSpace,
    NetworkTimeout,
    SocketsDefuncted,
    DriveAsleep,
    DriveWakingUp,
    InconsistentPinState,
    UnableToCreateVfs,
    OperationCanceled,
    WorkerExited,
    SyncDirDoesntExist,
    SyncDirAccessError,
}

/// The `(code, cause)` pair returned by every VFS and comm operation.
///
/// Success is represented by `Ok(..)` of an [`ExitResult`]; an `ExitInfo`
/// used as an error therefore never carries `ExitCode::Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{code:?} ({cause:?})")]
pub struct ExitInfo {
    pub code: ExitCode,
    pub cause: ExitCause,
}

pub type ExitResult<T> = Result<T, ExitInfo>;

impl ExitInfo {
    pub const fn new(code: ExitCode, cause: ExitCause) -> Self {
        Self { code, cause }
    }

    /// `SystemError` with a specific cause, the most common VFS failure shape.
    pub const fn system(cause: ExitCause) -> Self {
        Self::new(ExitCode::SystemError, cause)
    }

    /// `LogicError` with a specific cause.
    pub const fn logic(cause: ExitCause) -> Self {
        Self::new(ExitCode::LogicError, cause)
    }

    /// Default VFS error: the file gets blacklisted until the user edits,
    /// moves or deletes it, or the sync is restarted.
    pub const fn default_vfs_error() -> Self {
        Self::system(ExitCause::FileAccessError)
    }

    pub const fn code(&self) -> ExitCode {
        self.code
    }

    pub const fn cause(&self) -> ExitCause {
        self.cause
    }
}

impl From<ExitCode> for ExitInfo {
    fn from(code: ExitCode) -> Self {
        Self::new(code, ExitCause::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_only_conversion_defaults_cause_to_unknown() {
        let info: ExitInfo = ExitCode::NetworkError.into();
        assert_eq!(info.code(), ExitCode::NetworkError);
        assert_eq!(info.cause(), ExitCause::Unknown);
    }

    #[test]
    fn display_names_both_fields() {
        let info = ExitInfo::system(ExitCause::NotFound);
        let text = info.to_string();
        assert!(text.contains("SystemError"));
        assert!(text.contains("NotFound"));
    }
}
