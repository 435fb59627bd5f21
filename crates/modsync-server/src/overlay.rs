//! Per-identity overlay directories
//!
//! ```text
//! <root>/RemotePlugins/
//!   DefaultPlugins/      seed, copied from the live sync paths at startup
//!   alice/               private copy for identity "alice"
//!   bob/
//! ```
//!
//! Provisioning copies the seed into a uniquely named temporary directory
//! and renames it into place. Within the process a per-identity mutex makes
//! concurrent first requests wait for one copy; across processes the rename
//! decides, and whoever loses throws its copy away.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use modsync_core::SyncPathSpec;
use modsync_fs::{NormalizedPath, fold_key, io, validate_path_identifier};

use crate::{Error, Result};

#[derive(Debug)]
pub struct OverlayStore {
    root: NormalizedPath,
    seed: String,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl OverlayStore {
    /// `root` is the directory holding the seed and every overlay.
    pub fn new(root: NormalizedPath, seed: impl Into<String>) -> Self {
        Self {
            root,
            seed: seed.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    pub fn seed_dir(&self) -> NormalizedPath {
        self.root.join(&self.seed)
    }

    /// Directory for `identity`, whether or not it exists yet.
    pub fn dir_for(&self, identity: &str) -> Result<NormalizedPath> {
        validate_path_identifier(identity).map_err(|e| Error::InvalidIdentity {
            identity: identity.to_string(),
            reason: e.to_string(),
        })?;
        if fold_key(identity) == fold_key(&self.seed) {
            return Err(Error::InvalidIdentity {
                identity: identity.to_string(),
                reason: "name is reserved for the default overlay".into(),
            });
        }
        Ok(self.root.join(identity))
    }

    /// Create the seed from the live sync paths if it is missing.
    ///
    /// Returns whether a seed was created.
    pub fn ensure_default_seed(&self, live_root: &NormalizedPath, specs: &[SyncPathSpec]) -> Result<bool> {
        let seed = self.seed_dir();
        if seed.exists() {
            return Ok(false);
        }

        let temp = self.temp_dir(&self.seed);
        let mut copied = 0;
        std::fs::create_dir_all(&temp).map_err(|e| modsync_fs::Error::io(&temp, e))?;
        for spec in specs {
            let relative = modsync_fs::sanitize_relative(&spec.path)?;
            let source = live_root.join(&relative).to_native();
            let target = temp.join(&relative);
            if source.is_dir() {
                copied += io::copy_dir_all(&source, &target)?;
            } else if source.is_file() {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| modsync_fs::Error::io(parent, e))?;
                }
                std::fs::copy(&source, &target).map_err(|e| modsync_fs::Error::io(&target, e))?;
                copied += 1;
            } else {
                tracing::warn!(path = %spec.path, "Sync path does not exist, not seeding it");
            }
        }

        let created = publish(&temp, &seed.to_native())?;
        if created {
            tracing::info!(path = %seed, files = copied, "Created default overlay seed");
        }
        Ok(created)
    }

    /// Directory for `identity`, created from the seed on first use.
    pub async fn provision(&self, identity: &str) -> Result<NormalizedPath> {
        let dir = self.dir_for(identity)?;
        if dir.exists() {
            return Ok(dir);
        }

        let lock = self.lock_for(identity);
        let _guard = lock.lock().await;
        if dir.exists() {
            return Ok(dir);
        }

        let seed = self.seed_dir().to_native();
        let temp = self.temp_dir(identity);
        let target = dir.to_native();
        let identity_name = identity.to_string();

        let created = tokio::task::spawn_blocking(move || -> Result<bool> {
            if seed.is_dir() {
                io::copy_dir_all(&seed, &temp)?;
            } else {
                tracing::warn!(seed = %seed.display(), "No overlay seed, starting identity empty");
                std::fs::create_dir_all(&temp).map_err(|e| modsync_fs::Error::io(&temp, e))?;
            }
            publish(&temp, &target)
        })
        .await
        .map_err(modsync_core::Error::from)??;

        if created {
            tracing::info!(identity = %identity_name, path = %dir, "Provisioned identity overlay");
        }
        Ok(dir)
    }

    fn lock_for(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(fold_key(identity)).or_default().clone()
    }

    fn temp_dir(&self, name: &str) -> PathBuf {
        self.root
            .join(&format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
            .to_native()
    }
}

/// Rename `temp` to `target`. If someone else got there first, discard
/// `temp` and report that nothing was created.
fn publish(temp: &Path, target: &Path) -> Result<bool> {
    match std::fs::rename(temp, target) {
        Ok(()) => Ok(true),
        Err(_) if target.exists() => {
            io::remove_dir_if_exists(temp)?;
            tracing::debug!(path = %target.display(), "Overlay created concurrently, discarding copy");
            Ok(false)
        }
        Err(e) => {
            let _ = io::remove_dir_if_exists(temp);
            Err(modsync_fs::Error::io(target, e).into())
        }
    }
}
