//! Client-side settings persisted in the data directory

use std::collections::BTreeMap;

use modsync_fs::{ConfigStore, NormalizedPath, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::transfer::{DOWNLOAD_CONCURRENCY, HASH_CONCURRENCY};
use crate::{Result, SyncPathSpec};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:6969";

/// Per-install client preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientSettings {
    /// Base URL of the sync server
    pub server: String,
    /// Identity sent to the server to select a personal overlay
    pub identity: Option<String>,
    /// Delete files the server stopped shipping (enforced paths always do)
    pub delete_removed_files: bool,
    /// No one is around to confirm, apply everything silently
    pub headless: bool,
    /// User choices keyed by sync path; absent means "server default"
    pub toggles: BTreeMap<String, bool>,
    pub download_concurrency: usize,
    pub hash_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER_URL.to_string(),
            identity: None,
            delete_removed_files: true,
            headless: false,
            toggles: BTreeMap::new(),
            download_concurrency: DOWNLOAD_CONCURRENCY,
            hash_concurrency: HASH_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientSettings {
    /// Load settings, using defaults when the file does not exist yet.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        Ok(ConfigStore::new().load_or_default(path)?)
    }

    pub fn save(&self, path: &NormalizedPath) -> Result<()> {
        Ok(ConfigStore::new().save(path, self)?)
    }

    /// The user's toggle for `spec`, matched case-insensitively.
    pub fn toggle_for(&self, spec: &SyncPathSpec) -> Option<bool> {
        let key = spec.key();
        self.toggles
            .iter()
            .find(|(path, _)| modsync_fs::fold_key(path.trim_end_matches('/')) == key)
            .map(|(_, enabled)| *enabled)
    }

    pub fn is_enabled(&self, spec: &SyncPathSpec) -> bool {
        spec.is_enabled_with(self.toggle_for(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_delete_removed_files() {
        let settings = ClientSettings::default();
        assert!(settings.delete_removed_files);
        assert_eq!(settings.download_concurrency, 8);
    }

    #[test]
    fn toggles_match_case_insensitively() {
        let mut settings = ClientSettings::default();
        settings.toggles.insert("User/Mods".into(), false);
        let spec = SyncPathSpec::new("user/mods");
        assert_eq!(settings.toggle_for(&spec), Some(false));
        assert!(!settings.is_enabled(&spec));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = NormalizedPath::new(dir.path().join("Settings.json"));
        std::fs::write(path.to_native(), r#"{"headless": true}"#).unwrap();

        let settings = ClientSettings::load(&path).unwrap();
        assert!(settings.headless);
        assert_eq!(settings.server, DEFAULT_SERVER_URL);
    }
}
