//! Per-sync-path file catalogs
//!
//! A catalog maps root-relative paths to content fingerprints. Keys compare
//! case-insensitively, but the first spelling seen is kept for display and
//! for writing files back to disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use modsync_fs::{ContentHasher, Fingerprint, NormalizedPath, fold_key, sanitize_relative};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::transfer::{ConcurrencyLimiter, HASH_CONCURRENCY};
use crate::{ExclusionMatcher, Result};

/// One file, or one empty-directory marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModFileRecord {
    /// Content fingerprint; the empty sentinel for directories
    pub hash: Fingerprint,
    #[serde(alias = "directory")]
    pub is_directory: bool,
}

impl ModFileRecord {
    pub fn file(hash: Fingerprint) -> Self {
        Self {
            hash,
            is_directory: false,
        }
    }

    pub fn directory() -> Self {
        Self {
            hash: Fingerprint::directory(),
            is_directory: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    path: String,
    record: ModFileRecord,
}

/// Catalog of one sync path: relative path to record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, ModFileRecord>",
    into = "BTreeMap<String, ModFileRecord>"
)]
pub struct PathCatalog {
    entries: BTreeMap<String, Entry>,
}

fn clean_key_path(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

impl PathCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record. A replaced entry keeps the new spelling.
    pub fn insert(&mut self, path: impl AsRef<str>, record: ModFileRecord) -> Option<ModFileRecord> {
        let path = clean_key_path(path.as_ref());
        self.entries
            .insert(fold_key(&path), Entry { path, record })
            .map(|old| old.record)
    }

    pub fn get(&self, path: &str) -> Option<&ModFileRecord> {
        self.entries
            .get(&fold_key(&clean_key_path(path)))
            .map(|e| &e.record)
    }

    /// Record plus the catalog's own spelling of `path`.
    pub fn entry(&self, path: &str) -> Option<(&str, &ModFileRecord)> {
        self.entries
            .get(&fold_key(&clean_key_path(path)))
            .map(|e| (e.path.as_str(), &e.record))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn remove(&mut self, path: &str) -> Option<ModFileRecord> {
        self.entries
            .remove(&fold_key(&clean_key_path(path)))
            .map(|e| e.record)
    }

    /// Whether any entry lies strictly below directory `dir`.
    pub fn has_descendant(&self, dir: &str) -> bool {
        let prefix = format!("{}/", fold_key(&clean_key_path(dir)));
        self.entries
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    /// Keep only entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &ModFileRecord) -> bool) {
        self.entries.retain(|_, e| keep(&e.path, &e.record));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.entries.values().filter(|e| !e.record.is_directory).count()
    }

    /// Iterate in case-folded key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModFileRecord)> {
        self.entries.values().map(|e| (e.path.as_str(), &e.record))
    }
}

impl From<BTreeMap<String, ModFileRecord>> for PathCatalog {
    fn from(map: BTreeMap<String, ModFileRecord>) -> Self {
        let mut catalog = Self::new();
        for (path, record) in map {
            catalog.insert(path, record);
        }
        catalog
    }
}

impl From<PathCatalog> for BTreeMap<String, ModFileRecord> {
    fn from(catalog: PathCatalog) -> Self {
        catalog
            .entries
            .into_values()
            .map(|e| (e.path, e.record))
            .collect()
    }
}

impl FromIterator<(String, ModFileRecord)> for PathCatalog {
    fn from_iter<I: IntoIterator<Item = (String, ModFileRecord)>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for (path, record) in iter {
            catalog.insert(path, record);
        }
        catalog
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    sync_path: String,
    catalog: PathCatalog,
}

/// Catalogs for several sync paths, keyed case-insensitively by sync path.
///
/// This is the shape of `/sync/hashes` responses and of the persisted
/// previous-sync snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, PathCatalog>",
    into = "BTreeMap<String, PathCatalog>"
)]
pub struct CatalogSet {
    paths: BTreeMap<String, Slot>,
}

impl CatalogSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sync_path: impl AsRef<str>, catalog: PathCatalog) -> Option<PathCatalog> {
        let sync_path = clean_key_path(sync_path.as_ref());
        self.paths
            .insert(fold_key(&sync_path), Slot { sync_path, catalog })
            .map(|old| old.catalog)
    }

    pub fn get(&self, sync_path: &str) -> Option<&PathCatalog> {
        self.paths
            .get(&fold_key(&clean_key_path(sync_path)))
            .map(|s| &s.catalog)
    }

    pub fn remove(&mut self, sync_path: &str) -> Option<PathCatalog> {
        self.paths
            .remove(&fold_key(&clean_key_path(sync_path)))
            .map(|s| s.catalog)
    }

    /// Replace this set's catalogs with every catalog present in `other`.
    /// Sync paths absent from `other` are left untouched.
    pub fn merge(&mut self, other: &CatalogSet) {
        for (sync_path, catalog) in other.iter() {
            self.insert(sync_path, catalog.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Total number of records across all sync paths.
    pub fn entry_count(&self) -> usize {
        self.paths.values().map(|s| s.catalog.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PathCatalog)> {
        self.paths
            .values()
            .map(|s| (s.sync_path.as_str(), &s.catalog))
    }
}

impl From<BTreeMap<String, PathCatalog>> for CatalogSet {
    fn from(map: BTreeMap<String, PathCatalog>) -> Self {
        let mut set = Self::new();
        for (sync_path, catalog) in map {
            set.insert(sync_path, catalog);
        }
        set
    }
}

impl From<CatalogSet> for BTreeMap<String, PathCatalog> {
    fn from(set: CatalogSet) -> Self {
        set.paths
            .into_values()
            .map(|s| (s.sync_path, s.catalog))
            .collect()
    }
}

/// A directory entry that survived exclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    /// Path relative to the builder's base, forward slashes
    pub relative: String,
    pub native: PathBuf,
    pub is_directory: bool,
}

/// One sync path to catalogue, with the exclusions that apply to it.
#[derive(Debug, Clone)]
pub struct CatalogTarget {
    pub sync_path: String,
    pub matcher: ExclusionMatcher,
    /// Directory to resolve `sync_path` against instead of the builder's base
    pub base: Option<NormalizedPath>,
}

impl CatalogTarget {
    pub fn new(sync_path: impl Into<String>, matcher: ExclusionMatcher) -> Self {
        Self {
            sync_path: sync_path.into(),
            matcher,
            base: None,
        }
    }

    pub fn with_base(mut self, base: NormalizedPath) -> Self {
        self.base = Some(base);
        self
    }
}

/// Walks sync paths below a base directory and fingerprints what it finds.
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    base: NormalizedPath,
    hasher: ContentHasher,
    limiter: ConcurrencyLimiter,
}

impl CatalogBuilder {
    pub fn new(base: NormalizedPath) -> Self {
        Self {
            base,
            hasher: ContentHasher::default(),
            limiter: ConcurrencyLimiter::new(HASH_CONCURRENCY),
        }
    }

    pub fn with_hasher(mut self, hasher: ContentHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Cap on files hashed at the same time.
    pub fn with_concurrency(mut self, capacity: usize) -> Self {
        self.limiter = ConcurrencyLimiter::new(capacity);
        self
    }

    pub fn base(&self) -> &NormalizedPath {
        &self.base
    }

    /// List the files and empty directories under `sync_path`.
    ///
    /// Excluded entries are pruned before descending, so nothing below an
    /// excluded directory is visited. A directory is reported only if nothing
    /// inside it survived. A missing sync path, or one that is itself
    /// excluded, yields an empty list. Symlinked directories are skipped.
    pub fn scan(&self, sync_path: &str, matcher: &ExclusionMatcher) -> Result<Vec<ScannedEntry>> {
        let logical = sanitize_relative(sync_path)?;
        let root = self.base.join(&logical);
        let native_root = root.to_native();

        if matcher.excludes_tree(&root) {
            tracing::debug!(path = %root, "Sync path is excluded, skipping it");
            return Ok(Vec::new());
        }

        let metadata = match std::fs::metadata(&native_root) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %root, "Sync path does not exist, treating it as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(modsync_fs::Error::io(&native_root, e).into()),
        };

        if !metadata.is_dir() {
            return Ok(vec![ScannedEntry {
                relative: logical,
                native: native_root,
                is_directory: false,
            }]);
        }

        let mut entries = Vec::new();
        let mut directories = Vec::new();
        let mut survivors: HashMap<PathBuf, usize> = HashMap::new();

        let walker = WalkDir::new(&native_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !matcher.matches_path(&NormalizedPath::new(e.path())));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| native_root.clone());
                modsync_fs::Error::io(path, e.into())
            })?;

            if entry.path_is_symlink() && entry.depth() > 0 && entry.path().is_dir() {
                tracing::warn!(path = %entry.path().display(), "Skipping symlinked directory");
                continue;
            }

            if entry.depth() > 0
                && let Some(parent) = entry.path().parent()
            {
                *survivors.entry(parent.to_path_buf()).or_default() += 1;
            }

            let relative = relative_key(&logical, &native_root, entry.path());
            if entry.file_type().is_dir() {
                directories.push((entry.path().to_path_buf(), relative));
            } else {
                entries.push(ScannedEntry {
                    relative,
                    native: entry.path().to_path_buf(),
                    is_directory: false,
                });
            }
        }

        for (native, relative) in directories {
            if survivors.get(&native).copied().unwrap_or(0) == 0 {
                entries.push(ScannedEntry {
                    relative,
                    native,
                    is_directory: true,
                });
            }
        }

        Ok(entries)
    }

    /// Scan and hash a single sync path on the current thread.
    pub fn walk(&self, sync_path: &str, matcher: &ExclusionMatcher) -> Result<PathCatalog> {
        let mut catalog = PathCatalog::new();
        for entry in self.scan(sync_path, matcher)? {
            let record = if entry.is_directory {
                ModFileRecord::directory()
            } else {
                ModFileRecord::file(self.hasher.hash_file(&entry.native)?)
            };
            catalog.insert(entry.relative, record);
        }
        Ok(catalog)
    }

    /// Catalogue every target, hashing files in parallel.
    ///
    /// Targets are processed in order and a path already catalogued for an
    /// earlier target is skipped for later ones, so nested sync paths should
    /// come before their parents. Keys are relative to each target's base, so
    /// targets read from different directories still share one key space.
    /// Any hashing failure aborts the build.
    pub async fn build(&self, targets: &[CatalogTarget]) -> Result<CatalogSet> {
        let started = Instant::now();
        let mut processed = HashSet::new();
        let mut catalogs = vec![PathCatalog::new(); targets.len()];
        let mut pending = Vec::new();

        for (index, target) in targets.iter().enumerate() {
            let mut builder = self.clone();
            if let Some(base) = &target.base {
                builder.base = base.clone();
            }
            let scan_target = target.clone();
            let scanned = tokio::task::spawn_blocking(move || {
                builder.scan(&scan_target.sync_path, &scan_target.matcher)
            })
            .await??;

            for entry in scanned {
                if !processed.insert(fold_key(&entry.relative)) {
                    continue;
                }
                if entry.is_directory {
                    catalogs[index].insert(&entry.relative, ModFileRecord::directory());
                    continue;
                }

                let guard = self.limiter.acquire().await?;
                let hasher = self.hasher;
                let native = entry.native;
                let handle = tokio::task::spawn_blocking(move || {
                    let _guard = guard;
                    hasher.hash_file(&native)
                });
                pending.push((index, entry.relative, handle));
            }
        }

        for (index, relative, handle) in pending {
            let hash = handle.await??;
            catalogs[index].insert(relative, ModFileRecord::file(hash));
        }

        let mut set = CatalogSet::new();
        for (target, catalog) in targets.iter().zip(catalogs) {
            set.insert(&target.sync_path, catalog);
        }

        tracing::info!(
            entries = processed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Catalogued sync paths"
        );
        Ok(set)
    }
}

fn relative_key(logical: &str, native_root: &Path, path: &Path) -> String {
    match path.strip_prefix(native_root) {
        Ok(inner) if inner.as_os_str().is_empty() => logical.to_string(),
        Ok(inner) => format!("{}/{}", logical, inner.to_string_lossy().replace('\\', "/")),
        Err(_) => logical.to_string(),
    }
}
