//! Error types for modsync-server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type for modsync-server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in modsync-server operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A requested path climbs out of the server root
    #[error("Requested path '{path}' escapes the server root")]
    Traversal { path: String },

    /// A requested path is not below any declared sync path
    #[error("Requested file '{path}' is not in a sync path")]
    NotInSyncPath { path: String },

    /// A requested file is excluded from syncing
    #[error("Requested file '{path}' is excluded")]
    Excluded { path: String },

    /// A requested file does not exist
    #[error("Requested file '{path}' does not exist")]
    NotFound { path: String },

    /// The identity header is not a usable directory name
    #[error("Invalid identity '{identity}': {reason}")]
    InvalidIdentity { identity: String, reason: String },

    /// The client version header is not a semantic version
    #[error("Invalid client version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// The server configuration cannot be used
    #[error("Invalid server configuration: {message}")]
    Config { message: String },

    // Transparent wrappers for underlying errors
    /// Error from modsync-core
    #[error(transparent)]
    Core(#[from] modsync_core::Error),

    /// Filesystem error from modsync-fs
    #[error(transparent)]
    Fs(#[from] modsync_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Traversal { .. } | Self::InvalidIdentity { .. } | Self::InvalidVersion { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotInSyncPath { .. } | Self::Excluded { .. } | Self::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::Fs(modsync_fs::Error::PathTraversal { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "Request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_mistakes_map_to_4xx() {
        let traversal = Error::Traversal {
            path: "../etc".into(),
        };
        assert_eq!(traversal.status(), StatusCode::BAD_REQUEST);

        let missing = Error::NotInSyncPath {
            path: "user/profiles/x.json".into(),
        };
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_failures_map_to_500() {
        let err = Error::from(std::io::Error::other("disk on fire"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
