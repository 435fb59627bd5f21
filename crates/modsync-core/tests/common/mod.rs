#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use modsync_core::{
    CatalogSet, Error, FileSource, ModFileRecord, PathCatalog, RemoteSource, Result, SyncPathSpec,
};
use modsync_fs::{ContentHasher, fold_key};

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Fail transiently this many times, then succeed
    Transient(u32),
    Permanent,
}

/// An in-memory server.
pub struct MemoryRemote {
    pub version: String,
    pub specs: Vec<SyncPathSpec>,
    pub exclusions: Vec<String>,
    files: Mutex<BTreeMap<String, (String, Vec<u8>)>>,
    failures: Mutex<HashMap<String, Failure>>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl MemoryRemote {
    pub fn new(specs: Vec<SyncPathSpec>) -> Self {
        Self {
            version: "0.9.0".to_string(),
            specs,
            exclusions: Vec::new(),
            files: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn put(&self, path: &str, content: &str) -> &Self {
        self.files
            .lock()
            .unwrap()
            .insert(fold_key(path), (path.to_string(), content.as_bytes().to_vec()));
        self
    }

    pub fn delete(&self, path: &str) -> &Self {
        self.files.lock().unwrap().remove(&fold_key(path));
        self
    }

    pub fn fail(&self, path: &str, failure: Failure) -> &Self {
        self.failures.lock().unwrap().insert(fold_key(path), failure);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn catalog_for(&self, sync_path: &str) -> PathCatalog {
        let hasher = ContentHasher::default();
        let prefix = fold_key(sync_path);
        self.files
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| **key == prefix || key.starts_with(&format!("{prefix}/")))
            .map(|(_, (path, bytes))| (path.clone(), ModFileRecord::file(hasher.hash_bytes(bytes))))
            .collect()
    }
}

#[async_trait]
impl FileSource for MemoryRemote {
    async fn fetch(&self, relative_path: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let key = fold_key(relative_path);
        {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&key) {
                Some(Failure::Permanent) => {
                    return Err(Error::permanent(format!("{relative_path}: 404")));
                }
                Some(Failure::Transient(remaining)) if *remaining > 0 => {
                    *remaining -= 1;
                    return Err(Error::transient(format!("{relative_path}: connection reset")));
                }
                _ => {}
            }
        }

        self.files
            .lock()
            .unwrap()
            .get(&key)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| Error::permanent(format!("{relative_path}: 404")))
    }
}

#[async_trait]
impl RemoteSource for MemoryRemote {
    async fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    async fn sync_paths(&self) -> Result<Vec<SyncPathSpec>> {
        Ok(self.specs.clone())
    }

    async fn exclusions(&self) -> Result<Vec<String>> {
        Ok(self.exclusions.clone())
    }

    async fn hashes(&self, paths: &[String]) -> Result<CatalogSet> {
        let requested: Vec<String> = paths.iter().map(|p| fold_key(p)).collect();
        let mut set = CatalogSet::new();
        for spec in &self.specs {
            if spec.enforced || requested.contains(&spec.key()) {
                set.insert(&spec.path, self.catalog_for(&spec.path));
            }
        }
        Ok(set)
    }
}
