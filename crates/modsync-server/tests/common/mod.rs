#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use modsync_core::SyncPathSpec;
use modsync_server::config::SyncPathEntry;
use modsync_server::{ServerCatalogService, ServerConfig, router};
use modsync_test_utils::TestTree;
use tower::ServiceExt;

/// A served install root with a plugin folder and an optional mods folder.
pub struct Fixture {
    pub tree: TestTree,
    pub service: Arc<ServerCatalogService>,
}

impl Fixture {
    pub fn new() -> Self {
        let tree = TestTree::new();
        tree.write("BepInEx/plugins/a.dll", "plugin a")
            .write("BepInEx/plugins/sub/b.dll", "plugin b")
            .write("BepInEx/plugins/notes.nosync", "local")
            .mkdir("BepInEx/plugins/empty")
            .write("user/mods/server-mod/mod.ts", "export {}")
            .write("user/profiles/secret.json", "{}")
            .write("secret.txt", "top secret");
        Self::with_tree(tree)
    }

    pub fn with_tree(tree: TestTree) -> Self {
        let config = ServerConfig {
            root: tree.root().to_path_buf(),
            version: "0.9.0".into(),
            sync_paths: vec![
                SyncPathEntry::Bare("BepInEx/plugins".into()),
                SyncPathEntry::Table(SyncPathSpec::new("user/mods").restart_required(false)),
            ],
            exclusions: vec!["**/*.nosync".into()],
            ..ServerConfig::default()
        };
        let service = Arc::new(ServerCatalogService::from_config(&config).unwrap());
        Self { tree, service }
    }

    pub fn router(&self) -> Router {
        router(self.service.clone())
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.router()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status for response");
}
