//! Filesystem primitives for ModSync
//!
//! Provides separator-agnostic path handling, atomic I/O, the retry policy
//! shared by hashing and transfers, and the size-aware content fingerprint
//! that client and server must agree on.

pub mod config;
pub mod error;
pub mod hash;
pub mod io;
pub mod path;
pub mod retry;

pub use config::{ConfigStore, Format};
pub use error::{Error, Result};
pub use hash::{ContentHasher, Fingerprint};
pub use io::RobustnessConfig;
pub use path::{NormalizedPath, fold_key, sanitize_relative, validate_path_identifier};
pub use retry::{Delay, RetryPolicy};
