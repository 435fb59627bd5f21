//! Server configuration
//!
//! Loaded from TOML or JSON by extension. A missing file is created with
//! [`ServerConfig::default`] so operators have something to edit.

use std::path::PathBuf;

use modsync_core::transfer::HASH_CONCURRENCY;
use modsync_core::{SyncPathSpec, validate_sync_paths};
use modsync_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::fallback::FallbackPayload;
use crate::{Error, Result};

pub const DEFAULT_BIND: &str = "127.0.0.1:6969";
pub const UPDATER_PATH: &str = "ModSync.Updater.exe";
pub const PLUGIN_PATH: &str = "BepInEx/plugins/Corter-ModSync.dll";

/// Exclusions every new configuration starts with.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "BepInEx/plugins/spt",
    "BepInEx/patchers/spt-prepatch.dll",
    "BepInEx/plugins/DanW-SPTQuestingBots/log",
    "user/mods/SPT-Realism/ProfileBackups",
    "user/mods/fika-server/types",
    "user/mods/fika-server/cache",
    "BepInEx/plugins/Fika.Dedicated.dll",
    "user/mods/zzDrakiaXYZ-LiveFleaPrices/config",
    "BepInEx/plugins/kmyuhkyuk-EFTApi/cache",
    "user/mods/ExpandedTaskText/src/**/cache.json",
    "user/mods/leaves-loot_fuckery/output",
    "user/mods/zz_guiltyman-addmissingquestweaponrequirements/log.log",
    "user/mods/zz_guiltyman-addmissingquestweaponrequirements/user/logs",
    "user/mods/acidphantasm-progressivebotsystem/logs",
    "BepInEx/patchers/Corter-ModSync-Patcher.dll",
    "**/*.nosync",
    "**/*.nosync.txt",
    "user/mods/**/.git",
    "user/mods/**/node_modules",
    "user/mods/**/*.js",
    "user/mods/**/*.js.map",
    "**/*:Zone.Identifier",
];

/// A sync path as an operator writes it: a bare path, or a full table.
///
/// Bare paths are enabled and enforced. Tables take the usual defaults
/// (enabled, optional, not silent, restart required).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncPathEntry {
    Bare(String),
    Table(SyncPathSpec),
}

impl SyncPathEntry {
    pub fn into_spec(self) -> SyncPathSpec {
        match self {
            Self::Bare(path) => SyncPathSpec::new(path).enforced(true),
            Self::Table(mut spec) => {
                spec.path = spec.path.replace('\\', "/");
                if spec.name.is_empty() {
                    spec.name = spec.path.clone();
                }
                spec
            }
        }
    }
}

/// Where per-identity overlays live, relative to the server root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub root: String,
    /// Directory under `root` that new identities are seeded from
    pub seed: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            root: "RemotePlugins".into(),
            seed: "DefaultPlugins".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Install root that sync paths are relative to
    pub root: PathBuf,
    pub bind: String,
    /// Version reported at `/sync/version`
    pub version: String,
    /// Oldest client version that understands the current wire format;
    /// older clients get a fallback payload
    pub baseline_version: semver::Version,
    pub hash_concurrency: usize,
    pub sync_paths: Vec<SyncPathEntry>,
    pub exclusions: Vec<String>,
    /// Extra fallback payloads, on top of the built-in ones
    pub fallbacks: Vec<FallbackPayload>,
    pub overlay: OverlayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let optional_mods = SyncPathSpec::new("user/mods")
            .with_name("(Optional) Server mods")
            .enabled(false)
            .restart_required(false);

        Self {
            root: PathBuf::from("."),
            bind: DEFAULT_BIND.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            baseline_version: semver::Version::new(0, 9, 0),
            hash_concurrency: HASH_CONCURRENCY,
            sync_paths: vec![
                SyncPathEntry::Bare("BepInEx/plugins".into()),
                SyncPathEntry::Bare("BepInEx/patchers".into()),
                SyncPathEntry::Bare("BepInEx/config".into()),
                SyncPathEntry::Table(optional_mods),
            ],
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            fallbacks: Vec::new(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load the configuration at `path`, writing the defaults there first if
    /// it does not exist. A relative `root` is resolved against the
    /// directory holding the file.
    pub fn load_or_init(path: &NormalizedPath) -> Result<Self> {
        let mut config: Self = ConfigStore::new().load_or_init(path, Self::default)?;
        if config.root.is_relative()
            && let Some(dir) = path.to_native().parent()
        {
            config.root = dir.join(&config.root);
        }
        Ok(config)
    }

    /// The full sync path list served to clients: the built-in paths for
    /// the updater and the client plugin, then the configured paths,
    /// longest first so nested paths are catalogued before their parents.
    pub fn resolved_sync_paths(&self) -> Vec<SyncPathSpec> {
        let mut user: Vec<SyncPathSpec> = self
            .sync_paths
            .iter()
            .cloned()
            .map(SyncPathEntry::into_spec)
            .collect();
        user.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        let mut specs = builtin_sync_paths();
        specs.extend(user);
        specs
    }

    /// Check everything that would make the server misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        validate_sync_paths(&self.resolved_sync_paths(), &self.exclusions)?;

        modsync_fs::validate_path_identifier(&self.overlay.seed).map_err(|e| {
            Error::config(format!("overlay seed '{}': {}", self.overlay.seed, e))
        })?;
        modsync_fs::sanitize_relative(&self.overlay.root).map_err(|e| {
            Error::config(format!("overlay root '{}': {}", self.overlay.root, e))
        })?;

        if self.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::config(format!("bind address '{}' is not host:port", self.bind)));
        }
        Ok(())
    }
}

/// Sync paths every server serves, ahead of the configured ones.
pub fn builtin_sync_paths() -> Vec<SyncPathSpec> {
    vec![
        SyncPathSpec::new(UPDATER_PATH)
            .with_name("(Builtin) ModSync Updater")
            .enforced(true)
            .silent(true)
            .restart_required(false),
        SyncPathSpec::new(PLUGIN_PATH)
            .with_name("(Builtin) ModSync Plugin")
            .enforced(true)
            .silent(true)
            .restart_required(true),
    ]
}
