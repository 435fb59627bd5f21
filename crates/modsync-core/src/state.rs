//! Client state that outlives a sync attempt
//!
//! Everything lives in one data directory below the install root:
//!
//! ```text
//! ModSync_Data/
//!   PreviousSync.json   catalogs applied by the last successful sync
//!   RemovedFiles.json   files for the updater to delete
//!   LocalHashes.json    last local catalog (diagnostic only)
//!   Exclusions.json     operator exclusions for optional paths
//!   Settings.json       client settings
//!   PendingUpdates/     staging area for restart-required files
//!   sync.lock           held while a sync applies changes
//! ```

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use fs2::FileExt;
use modsync_fs::{ConfigStore, NormalizedPath, io};
use serde::de::DeserializeOwned;

use crate::{CatalogSet, Error, Result};

pub const DATA_DIR_NAME: &str = "ModSync_Data";

/// Client-only mods a headless client never needs, seeded into
/// `Exclusions.json` the first time a headless client runs.
pub const HEADLESS_DEFAULT_EXCLUSIONS: &[&str] = &[
    "BepInEx/plugins/AmandsGraphics.dll",
    "BepInEx/plugins/AmandsSense.dll",
    "BepInEx/plugins/Sense",
    "BepInEx/plugins/MoreCheckmarks",
    "BepInEx/plugins/kmyuhkyuk-EFTApi",
    "BepInEx/plugins/DynamicMaps",
    "BepInEx/plugins/LootValue",
    "BepInEx/plugins/CactusPie.RamCleanerInterval.dll",
    "BepInEx/plugins/TYR_DeClutterer.dll",
];

/// Locations of the client's state files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    dir: NormalizedPath,
}

impl DataDir {
    /// The default data directory below `root`.
    pub fn for_root(root: &NormalizedPath) -> Self {
        Self {
            dir: root.join(DATA_DIR_NAME),
        }
    }

    pub fn new(dir: NormalizedPath) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.dir
    }

    pub fn previous_sync(&self) -> NormalizedPath {
        self.dir.join("PreviousSync.json")
    }

    pub fn removed_files(&self) -> NormalizedPath {
        self.dir.join("RemovedFiles.json")
    }

    pub fn local_hashes(&self) -> NormalizedPath {
        self.dir.join("LocalHashes.json")
    }

    pub fn exclusions(&self) -> NormalizedPath {
        self.dir.join("Exclusions.json")
    }

    pub fn settings(&self) -> NormalizedPath {
        self.dir.join("Settings.json")
    }

    pub fn staging(&self) -> NormalizedPath {
        self.dir.join("PendingUpdates")
    }

    pub fn lock_file(&self) -> NormalizedPath {
        self.dir.join("sync.lock")
    }
}

/// Exclusive hold on `sync.lock`. Released on drop.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Take the lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SyncInProgress`] if another process holds it.
    pub fn acquire(layout: &DataDir) -> Result<Self> {
        let path = layout.lock_file().to_native();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| modsync_fs::Error::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| modsync_fs::Error::io(&path, e))?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::SyncInProgress { path });
        }

        tracing::debug!(path = %path.display(), "Acquired sync lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Reads and writes the persisted sync state.
#[derive(Debug)]
pub struct PersistedSyncState {
    layout: DataDir,
    store: ConfigStore,
}

impl PersistedSyncState {
    pub fn new(layout: DataDir) -> Self {
        Self {
            layout,
            store: ConfigStore::new(),
        }
    }

    pub fn layout(&self) -> &DataDir {
        &self.layout
    }

    /// Catalogs applied by the last successful sync; empty if there was none.
    ///
    /// # Errors
    ///
    /// A snapshot that exists but does not parse is an error: planning
    /// without it could remove files or keep stale ones.
    pub fn load_previous(&self) -> Result<CatalogSet> {
        Ok(self.read(&self.layout.previous_sync())?.unwrap_or_default())
    }

    /// Operator exclusions for optional paths.
    ///
    /// A headless client without an exclusions file gets one seeded with
    /// [`HEADLESS_DEFAULT_EXCLUSIONS`].
    pub fn load_local_exclusions(&self, headless: bool) -> Result<Vec<String>> {
        let path = self.layout.exclusions();
        if headless {
            return self
                .store
                .load_or_init(&path, || {
                    HEADLESS_DEFAULT_EXCLUSIONS
                        .iter()
                        .map(|s| s.to_string())
                        .collect()
                })
                .map_err(malformed);
        }
        Ok(self.read(&path)?.unwrap_or_default())
    }

    /// Write the local catalog for troubleshooting.
    pub fn save_local_hashes(&self, local: &CatalogSet) -> Result<()> {
        Ok(self.store.save(&self.layout.local_hashes(), local)?)
    }

    /// Record a fully applied attempt.
    ///
    /// `remote` replaces the snapshot for the sync paths it contains; other
    /// paths keep their previous entries. Non-empty `removed` lists are added
    /// to the removal manifest for the external updater.
    pub fn commit(&self, remote: &CatalogSet, removed: &[String]) -> Result<()> {
        let mut snapshot = self.load_previous()?;
        snapshot.merge(remote);
        self.store.save(&self.layout.previous_sync(), &snapshot)?;

        if !removed.is_empty() {
            let mut manifest = self.removal_manifest()?;
            for path in removed {
                if !manifest.iter().any(|p| modsync_fs::fold_key(p) == modsync_fs::fold_key(path)) {
                    manifest.push(path.clone());
                }
            }
            self.store.save(&self.layout.removed_files(), &manifest)?;
        }

        tracing::info!(
            paths = remote.len(),
            entries = remote.entry_count(),
            removed = removed.len(),
            "Committed sync state"
        );
        Ok(())
    }

    /// Parse a JSON state file, `None` if it does not exist.
    fn read<T: DeserializeOwned>(&self, path: &NormalizedPath) -> Result<Option<T>> {
        self.store.load_if_exists(path).map_err(malformed)
    }

    /// Files queued for deletion by the updater.
    pub fn removal_manifest(&self) -> Result<Vec<String>> {
        Ok(self.read(&self.layout.removed_files())?.unwrap_or_default())
    }

    pub fn staging_exists(&self) -> bool {
        self.layout.staging().exists()
    }

    /// A previous attempt left work for the updater that has not been done.
    pub fn has_pending_update(&self) -> bool {
        self.staging_exists() || self.layout.removed_files().exists()
    }

    /// Delete the staging directory. Returns whether it existed.
    pub fn clear_staging(&self) -> Result<bool> {
        Ok(io::remove_dir_if_exists(&self.layout.staging().to_native())?)
    }

    /// Discard staged files and the removal manifest.
    pub fn rollback(&self) -> Result<bool> {
        let staging = self.clear_staging()?;
        let manifest_path = self.layout.removed_files().to_native();
        let manifest = match std::fs::remove_file(&manifest_path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(modsync_fs::Error::io(manifest_path, e).into()),
        };
        if staging || manifest {
            tracing::info!(staging, manifest, "Rolled back pending update");
        }
        Ok(staging || manifest)
    }
}

fn malformed(e: modsync_fs::Error) -> Error {
    match e {
        modsync_fs::Error::ConfigParse { path, message, .. } => Error::MalformedState { path, message },
        other => other.into(),
    }
}
