//! Sync path declarations and client settings

mod settings;
mod sync_path;

pub use settings::{ClientSettings, DEFAULT_SERVER_URL};
pub use sync_path::{SyncPathSpec, validate_sync_paths};
