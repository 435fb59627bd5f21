//! HTTP client for the sync server

use std::time::Duration;

use async_trait::async_trait;
use modsync_core::remote::{IDENTITY_HEADER, VERSION_HEADER};
use modsync_core::{CatalogSet, FileSource, RemoteSource, SyncPathSpec};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::{CliError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// [`RemoteSource`] backed by the server's `/sync/*` routes.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base: Url,
}

impl HttpRemote {
    /// Client for the server at `server`, sending `version` and, if set,
    /// `identity` with every request.
    pub fn new(server: &str, version: &str, identity: Option<&str>) -> Result<Self> {
        let invalid = |reason: String| CliError::ServerUrl {
            url: server.to_string(),
            reason,
        };

        let base = Url::parse(server).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("expected an http or https URL".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            VERSION_HEADER,
            HeaderValue::from_str(version).map_err(|e| invalid(e.to_string()))?,
        );
        if let Some(identity) = identity.map(str::trim).filter(|id| !id.is_empty()) {
            let value = HeaderValue::from_str(identity)
                .map_err(|e| CliError::user(format!("identity '{identity}' cannot be sent: {e}")))?;
            headers.insert(IDENTITY_HEADER, value);
        }

        let client = Client::builder()
            .user_agent(format!("modsync/{version}"))
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `base` with `segments` appended, each percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> modsync_core::Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| modsync_core::Error::permanent(format!("'{}' cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, query: &[(&str, &str)]) -> modsync_core::Result<Response> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("{} returned {}: {}", url.path(), status, body.trim());
        if is_transient_status(status) {
            Err(modsync_core::Error::transient(message))
        } else {
            Err(modsync_core::Error::permanent(message))
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> modsync_core::Result<T> {
        let url = self.endpoint(segments.iter().copied())?;
        let response = self.get(url.clone(), query).await?;
        response
            .json()
            .await
            .map_err(|e| modsync_core::Error::permanent(format!("{} sent an unreadable body: {}", url.path(), e)))
    }
}

fn request_error(url: &Url, err: reqwest::Error) -> modsync_core::Error {
    let message = format!("request to {} failed: {}", url.path(), err);
    if err.is_connect() || err.is_timeout() || err.is_body() {
        modsync_core::Error::transient(message)
    } else {
        modsync_core::Error::permanent(message)
    }
}

/// Server-side trouble that a later attempt may not hit.
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl FileSource for HttpRemote {
    async fn fetch(&self, relative_path: &str) -> modsync_core::Result<Vec<u8>> {
        let relative = relative_path.replace('\\', "/");
        let segments = ["sync", "fetch"]
            .into_iter()
            .chain(relative.split('/').filter(|s| !s.is_empty()));
        let url = self.endpoint(segments)?;

        let response = self.get(url.clone(), &[]).await?;
        let bytes = response.bytes().await.map_err(|e| request_error(&url, e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn version(&self) -> modsync_core::Result<String> {
        self.get_json(&["sync", "version"], &[]).await
    }

    async fn sync_paths(&self) -> modsync_core::Result<Vec<SyncPathSpec>> {
        self.get_json(&["sync", "paths"], &[]).await
    }

    async fn exclusions(&self) -> modsync_core::Result<Vec<String>> {
        self.get_json(&["sync", "exclusions"], &[]).await
    }

    async fn hashes(&self, paths: &[String]) -> modsync_core::Result<CatalogSet> {
        let query: Vec<(&str, &str)> = paths.iter().map(|p| ("path", p.as_str())).collect();
        self.get_json(&["sync", "hashes"], &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use modsync_server::config::SyncPathEntry;
    use modsync_server::{ServerCatalogService, ServerConfig, router};
    use modsync_test_utils::TestTree;

    /// Serve `tree` on an ephemeral port and return its base URL.
    async fn serve(tree: &TestTree) -> String {
        let config = ServerConfig {
            root: tree.root().to_path_buf(),
            sync_paths: vec![SyncPathEntry::Bare("BepInEx/plugins".into())],
            exclusions: vec!["**/*.nosync".into()],
            ..ServerConfig::default()
        };
        let service = Arc::new(ServerCatalogService::from_config(&config).unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(service)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn rejects_unusable_urls() {
        assert!(matches!(
            HttpRemote::new("not a url", "0.9.0", None),
            Err(CliError::ServerUrl { .. })
        ));
        assert!(matches!(
            HttpRemote::new("ftp://example.com", "0.9.0", None),
            Err(CliError::ServerUrl { .. })
        ));
    }

    #[test]
    fn fetch_paths_are_percent_encoded() {
        let remote = HttpRemote::new("http://127.0.0.1:6969/", "0.9.0", None).unwrap();
        let url = remote
            .endpoint(["sync", "fetch", "BepInEx", "plugins", "My Mod", "a#1.dll"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:6969/sync/fetch/BepInEx/plugins/My%20Mod/a%231.dll"
        );
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn talks_to_a_live_server() {
        let tree = TestTree::new();
        tree.write("BepInEx/plugins/My Mod/a.dll", "mod bytes")
            .write("BepInEx/plugins/skip.nosync", "x");
        let remote = HttpRemote::new(&serve(&tree).await, "0.9.0", None).unwrap();

        let specs = remote.sync_paths().await.unwrap();
        assert!(specs.iter().any(|s| s.path == "BepInEx/plugins"));
        assert_eq!(remote.exclusions().await.unwrap(), vec!["**/*.nosync".to_string()]);

        let catalogs = remote.hashes(&["BepInEx/plugins".into()]).await.unwrap();
        let plugins = catalogs.get("BepInEx/plugins").unwrap();
        assert!(plugins.contains("BepInEx/plugins/My Mod/a.dll"));
        assert!(!plugins.contains("BepInEx/plugins/skip.nosync"));

        let bytes = remote.fetch("BepInEx\\plugins\\My Mod\\a.dll").await.unwrap();
        assert_eq!(bytes, b"mod bytes");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_files_are_permanent_failures() {
        let tree = TestTree::new();
        tree.mkdir("BepInEx/plugins");
        let remote = HttpRemote::new(&serve(&tree).await, "0.9.0", None).unwrap();

        let err = remote.fetch("BepInEx/plugins/gone.dll").await.unwrap_err();

        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let remote = HttpRemote::new(&format!("http://{addr}"), "0.9.0", None).unwrap();

        let err = remote.version().await.unwrap_err();

        assert!(err.is_transient());
    }
}
