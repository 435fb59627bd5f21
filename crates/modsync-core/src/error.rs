//! Error types for modsync-core

use std::path::PathBuf;

use crate::session::SyncPhase;

/// Result type for modsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in modsync-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An exclusion glob could not be compiled
    #[error("Invalid exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A sync path declaration is unusable
    #[error("Invalid sync path '{path}': {reason}")]
    InvalidSyncPath { path: String, reason: String },

    /// A persisted state file exists but cannot be parsed
    #[error("Malformed sync state at {path}: {message}. Fix or delete the file and try again")]
    MalformedState { path: PathBuf, message: String },

    /// The session was asked to move between phases that are not adjacent
    #[error("Invalid sync phase transition from {from:?} to {to:?}")]
    InvalidTransition { from: SyncPhase, to: SyncPhase },

    /// A previous attempt left its staging directory behind
    #[error("Staged updates from a previous sync are still pending at {path}; run the updater or roll back first")]
    StagingInFlight { path: PathBuf },

    /// Another process holds the sync lock
    #[error("Another sync is already in progress (lock held on {path})")]
    SyncInProgress { path: PathBuf },

    /// A remote call failed
    #[error("Remote error: {message}")]
    Remote { message: String, transient: bool },

    /// Work was abandoned because the attempt was cancelled
    #[error("Sync cancelled")]
    Cancelled,

    /// A spawned task panicked or was aborted
    #[error("Background task failed: {message}")]
    TaskFailed { message: String },

    // Transparent wrappers for underlying errors
    /// Filesystem error from modsync-fs
    #[error(transparent)]
    Fs(#[from] modsync_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a remote error that is worth retrying.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            transient: true,
        }
    }

    /// Create a remote error that retrying cannot fix.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether retrying the failed unit of work could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fs(e) => e.is_transient(),
            Self::Io(e) => modsync_fs::error::is_transient_io(e),
            Self::Remote { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_carry_their_retry_class() {
        assert!(Error::transient("connection reset").is_transient());
        assert!(!Error::permanent("404 Not Found").is_transient());
    }

    #[test]
    fn wrapped_fs_errors_keep_classification() {
        let busy = modsync_fs::Error::io(
            "a.dll",
            std::io::Error::from(std::io::ErrorKind::WouldBlock),
        );
        assert!(Error::from(busy).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn staging_message_names_the_directory() {
        let err = Error::StagingInFlight {
            path: PathBuf::from("/game/ModSync_Data/PendingUpdates"),
        };
        assert!(err.to_string().contains("PendingUpdates"));
    }
}
