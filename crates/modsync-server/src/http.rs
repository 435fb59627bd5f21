//! HTTP surface
//!
//! | Route | Response |
//! |---|---|
//! | `GET /sync/version` | JSON string |
//! | `GET /sync/paths` | JSON array of sync paths |
//! | `GET /sync/exclusions` | JSON array of globs |
//! | `GET /sync/hashes?path=..` | catalogs, filtered to enforced or requested paths |
//! | `GET /sync/fetch/<path>` | file bytes, Range aware |

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::service::ServerCatalogService;
use crate::{Error, Result};

pub use modsync_core::remote::{IDENTITY_HEADER, VERSION_HEADER};

pub type AppState = Arc<ServerCatalogService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/sync/version", get(version))
        .route("/sync/paths", get(sync_paths))
        .route("/sync/exclusions", get(exclusions))
        .route("/sync/hashes", get(hashes))
        .route("/sync/fetch/*path", get(fetch))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value.to_str().map(|v| Some(v.trim())).map_err(|_| {
            if name == VERSION_HEADER {
                Error::InvalidVersion {
                    version: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    reason: "header is not valid ASCII".into(),
                }
            } else {
                Error::InvalidIdentity {
                    identity: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    reason: "header is not valid ASCII".into(),
                }
            }
        }),
    }
}

fn identity(headers: &HeaderMap) -> Result<Option<&str>> {
    Ok(header(headers, IDENTITY_HEADER)?.filter(|id| !id.is_empty()))
}

async fn version(State(service): State<AppState>) -> Json<String> {
    Json(service.version().to_string())
}

async fn sync_paths(State(service): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(payload) = service.fallbacks().resolve(header(&headers, VERSION_HEADER)?)? {
        return Ok(Json(payload.sync_paths.clone()).into_response());
    }
    Ok(Json(service.sync_paths().to_vec()).into_response())
}

async fn exclusions(State(service): State<AppState>) -> Json<Vec<String>> {
    Json(service.exclusions().to_vec())
}

async fn hashes(
    State(service): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    if let Some(payload) = service.fallbacks().resolve(header(&headers, VERSION_HEADER)?)? {
        return Ok(Json(payload.hashes.clone()).into_response());
    }

    let requested: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == "path")
        .map(|(_, value)| value.replace('\\', "/"))
        .collect();
    let requested = (!requested.is_empty()).then_some(requested);

    let catalogs = service
        .get_catalog(requested.as_deref(), identity(&headers)?)
        .await?;
    Ok(Json(catalogs).into_response())
}

async fn fetch(
    State(service): State<AppState>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response> {
    let identity = identity(request.headers())?.map(str::to_owned);
    let file = service.resolve_file(&path, identity.as_deref()).await?;

    let Ok(response) = ServeFile::new(file).oneshot(request).await;
    Ok(response.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identity_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(IDENTITY_HEADER, "  ".parse().unwrap());
        assert_eq!(identity(&headers).unwrap(), None);
    }

    #[test]
    fn identity_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(IDENTITY_HEADER, " alice ".parse().unwrap());
        assert_eq!(identity(&headers).unwrap(), Some("alice"));
    }
}
