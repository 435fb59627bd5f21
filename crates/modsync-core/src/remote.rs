//! Seams to the server

use async_trait::async_trait;

use crate::{CatalogSet, Result, SyncPathSpec};

/// Request header naming the identity whose overlay to serve.
pub const IDENTITY_HEADER: &str = "modsync-identity";
/// Request header carrying the client's version.
pub const VERSION_HEADER: &str = "modsync-version";

/// Somewhere file bytes can be fetched from by root-relative path.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Fetch the full content of `relative_path`.
    ///
    /// Errors for which [`Error::is_transient`](crate::Error::is_transient)
    /// holds are retried by the caller.
    async fn fetch(&self, relative_path: &str) -> Result<Vec<u8>>;
}

/// Everything a sync attempt asks of the server.
#[async_trait]
pub trait RemoteSource: FileSource {
    /// Server protocol version.
    async fn version(&self) -> Result<String>;

    /// Sync paths the server declares, in catalogue order.
    async fn sync_paths(&self) -> Result<Vec<SyncPathSpec>>;

    /// Server-side exclusion patterns.
    async fn exclusions(&self) -> Result<Vec<String>>;

    /// Catalogs for `paths` (enforced paths are always included).
    async fn hashes(&self, paths: &[String]) -> Result<CatalogSet>;
}
