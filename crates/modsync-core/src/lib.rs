//! Sync planning and transfer layer for ModSync
//!
//! This crate sits between the filesystem primitives in `modsync-fs` and the
//! client and server binaries:
//!
//! - **Exclusions**: glob patterns compiled once, matched against
//!   slash-normalized relative paths on both sides of the wire
//! - **Catalogs**: per-sync-path fingerprints of a directory tree, with
//!   markers for empty directories
//! - **Planner**: three-way diff of local, remote and previously synced
//!   catalogs into added/updated/removed/created sets
//! - **Transfers**: bounded, retrying, cancellable downloads into the live
//!   tree or a staging area
//! - **State**: the persisted previous-sync snapshot, the removal manifest
//!   and the data directory layout
//! - **Session**: the per-attempt state machine that ties it all together
//!
//! ```text
//!              modsync-cli    modsync-server
//!                     \          /
//!                     modsync-core
//!                          |
//!                      modsync-fs
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod planner;
pub mod remote;
pub mod session;
pub mod state;
pub mod transfer;

pub use catalog::{CatalogBuilder, CatalogSet, CatalogTarget, ModFileRecord, PathCatalog};
pub use config::{ClientSettings, SyncPathSpec, validate_sync_paths};
pub use error::{Error, Result};
pub use exclusion::{ExclusionMatcher, ExclusionSet};
pub use planner::{PlanOptions, PlanSummary, SyncPlan, SyncPlanSet, plan};
pub use remote::{FileSource, RemoteSource};
pub use session::{SyncCheck, SyncOutcome, SyncPhase, SyncSession};
pub use state::{DataDir, PersistedSyncState, SyncLock};
pub use transfer::{
    ConcurrencyLimiter, TransferFailure, TransferManager, TransferOutcome, TransferProgress,
    TransferReport,
};
