//! Bounded, retrying, cancellable units of work
//!
//! Hashing and downloading share one concurrency primitive,
//! [`ConcurrencyLimiter`], sized very differently: local hashing is cheap to
//! fan out widely, downloads are kept to a handful at a time.

mod limiter;
mod manager;
mod progress;

pub use limiter::{ConcurrencyLimiter, DOWNLOAD_CONCURRENCY, HASH_CONCURRENCY, UnitGuard};
pub use manager::{TransferFailure, TransferManager, TransferOutcome, TransferReport};
pub use progress::TransferProgress;
