//! Command implementations

mod rollback;
mod status;
mod sync;

pub use rollback::run_rollback;
pub use status::run_status;
pub use sync::{SyncOptions, run_sync};
