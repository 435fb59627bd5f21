//! Error types for modsync-fs

use std::path::PathBuf;

/// Result type for modsync-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in modsync-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Giving up on {path} after {attempts} attempts: {source}")]
    RetriesExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config at {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Failed to serialize {format} config for {path}: {message}")]
    ConfigSerialize {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },

    #[error("Path '{path}' escapes its root")]
    PathTraversal { path: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the failed operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { source, .. } => is_transient_io(source),
            Self::LockFailed { .. } => true,
            _ => false,
        }
    }
}

/// Classify an I/O error as "file is busy, try again later".
///
/// Windows reports sharing and lock violations as raw OS errors 32 and 33.
/// Unix reports busy devices and text files being executed as EBUSY (16)
/// and ETXTBSY (26).
pub fn is_transient_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    if matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::ResourceBusy
    ) {
        return true;
    }

    match err.raw_os_error() {
        #[cfg(windows)]
        Some(32) | Some(33) => true,
        #[cfg(unix)]
        Some(16) | Some(26) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn busy_errors_are_transient() {
        let err = Error::io("a.dll", std::io::Error::from(ErrorKind::WouldBlock));
        assert!(err.is_transient());
    }

    #[test]
    fn missing_file_is_not_transient() {
        let err = Error::io("a.dll", std::io::Error::from(ErrorKind::NotFound));
        assert!(!err.is_transient());
    }

    #[test]
    fn traversal_is_never_transient() {
        let err = Error::PathTraversal {
            path: "../x".into(),
        };
        assert!(!err.is_transient());
    }

    #[cfg(unix)]
    #[test]
    fn ebusy_is_transient() {
        assert!(is_transient_io(&std::io::Error::from_raw_os_error(16)));
    }
}
