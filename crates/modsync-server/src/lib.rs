//! Server side of ModSync
//!
//! Serves the declared sync paths, their catalogs and their files over
//! HTTP. Each client identity can get a private overlay of the served tree,
//! seeded from a shared default.
//!
//! ```text
//! http (axum routes)
//!   -> service (ServerCatalogService)
//!        -> overlay (per-identity directories)
//!        -> fallback (payloads for old clients)
//!        -> modsync-core (catalog building, exclusions)
//! ```

pub mod config;
pub mod error;
pub mod fallback;
pub mod http;
pub mod overlay;
pub mod service;

pub use config::{ServerConfig, SyncPathEntry, builtin_sync_paths};
pub use error::{Error, Result};
pub use fallback::{FallbackPayload, FallbackRegistry};
pub use http::{IDENTITY_HEADER, VERSION_HEADER, router};
pub use overlay::OverlayStore;
pub use service::ServerCatalogService;
