//! Catalogs and file resolution for the HTTP layer
//!
//! Requests without an identity read the live install root. Requests with
//! one read that identity's overlay, provisioned on first use, and fall back
//! to the live root for sync paths the overlay does not have.

use std::path::PathBuf;
use std::sync::Arc;

use modsync_core::{
    CatalogBuilder, CatalogSet, CatalogTarget, ExclusionMatcher, ExclusionSet, SyncPathSpec,
};
use modsync_fs::{NormalizedPath, fold_key, sanitize_relative};

use crate::config::ServerConfig;
use crate::fallback::FallbackRegistry;
use crate::overlay::OverlayStore;
use crate::{Error, Result};

pub struct ServerCatalogService {
    root: NormalizedPath,
    version: String,
    specs: Vec<SyncPathSpec>,
    exclusion_patterns: Vec<String>,
    exclusions: Arc<ExclusionSet>,
    overlays: OverlayStore,
    fallbacks: FallbackRegistry,
    hash_concurrency: usize,
}

impl ServerCatalogService {
    /// Build the service from a validated configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        config.validate()?;

        let root = NormalizedPath::new(&config.root);
        let overlay_root = root.join(&sanitize_relative(&config.overlay.root)?);

        let mut fallbacks = FallbackRegistry::with_builtins(config.baseline_version.clone());
        for payload in &config.fallbacks {
            fallbacks.register(payload.clone());
        }

        Ok(Self {
            exclusions: Arc::new(ExclusionSet::compile(&config.exclusions)?),
            exclusion_patterns: config.exclusions.clone(),
            specs: config.resolved_sync_paths(),
            version: config.version.clone(),
            overlays: OverlayStore::new(overlay_root, config.overlay.seed.clone()),
            fallbacks,
            hash_concurrency: config.hash_concurrency,
            root,
        })
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn sync_paths(&self) -> &[SyncPathSpec] {
        &self.specs
    }

    pub fn exclusions(&self) -> &[String] {
        &self.exclusion_patterns
    }

    pub fn overlays(&self) -> &OverlayStore {
        &self.overlays
    }

    pub fn fallbacks(&self) -> &FallbackRegistry {
        &self.fallbacks
    }

    /// Seed the default overlay from the live tree if it is missing.
    pub fn ensure_default_seed(&self) -> Result<bool> {
        self.overlays.ensure_default_seed(&self.root, &self.specs)
    }

    /// Catalogs for the sync paths a client asked for.
    ///
    /// With `requested` set, the result holds enforced paths plus the
    /// requested ones; without it, every sync path.
    pub async fn get_catalog(
        &self,
        requested: Option<&[String]>,
        identity: Option<&str>,
    ) -> Result<CatalogSet> {
        let wanted: Option<Vec<String>> =
            requested.map(|paths| paths.iter().map(|p| fold_key(p.trim_end_matches('/'))).collect());

        let overlay = match identity {
            Some(identity) => Some(self.overlays.provision(identity).await?),
            None => None,
        };

        let targets: Vec<CatalogTarget> = self
            .specs
            .iter()
            .filter(|spec| match &wanted {
                Some(wanted) => spec.enforced || wanted.contains(&spec.key()),
                None => true,
            })
            .map(|spec| self.target_for(spec, overlay.as_ref()))
            .collect();

        let catalogs = CatalogBuilder::new(self.root.clone())
            .with_concurrency(self.hash_concurrency)
            .build(&targets)
            .await?;

        tracing::debug!(
            identity = identity.unwrap_or("-"),
            paths = catalogs.len(),
            entries = catalogs.entry_count(),
            "Served catalog"
        );
        Ok(catalogs)
    }

    fn target_for(&self, spec: &SyncPathSpec, overlay: Option<&NormalizedPath>) -> CatalogTarget {
        if let Some(overlay) = overlay
            && overlay.join(&spec.path).exists()
        {
            return CatalogTarget::new(
                spec.path.clone(),
                ExclusionMatcher::mod_local(overlay, self.exclusions.clone()),
            )
            .with_base(overlay.clone());
        }
        CatalogTarget::new(
            spec.path.clone(),
            ExclusionMatcher::global(&self.root, self.exclusions.clone()),
        )
    }

    /// Resolve a requested file to a path on disk.
    ///
    /// The path is checked before anything is touched: it must not climb out
    /// of the root, must sit inside a declared sync path and must not be
    /// excluded. The identity's overlay copy wins over the live file.
    pub async fn resolve_file(&self, requested: &str, identity: Option<&str>) -> Result<PathBuf> {
        let relative = sanitize_relative(requested).map_err(|e| match e {
            modsync_fs::Error::PathTraversal { .. } => Error::Traversal {
                path: requested.to_string(),
            },
            _ => Error::NotFound {
                path: requested.to_string(),
            },
        })?;

        if !self.in_sync_path(&relative) {
            return Err(Error::NotInSyncPath { path: relative });
        }
        if self.exclusions.matches_prefix(&relative) {
            return Err(Error::Excluded { path: relative });
        }

        if let Some(identity) = identity {
            let overlay = self.overlays.provision(identity).await?;
            let candidate = overlay.join(&relative);
            if candidate.is_file() {
                tracing::debug!(identity, path = %relative, "Serving overlay file");
                return Ok(candidate.to_native());
            }
        }

        let live = self.root.join(&relative);
        if !live.is_file() {
            return Err(Error::NotFound { path: relative });
        }
        Ok(live.to_native())
    }

    fn in_sync_path(&self, relative: &str) -> bool {
        let key = fold_key(relative);
        self.specs.iter().any(|spec| {
            let root = spec.key();
            key == root || key.starts_with(&format!("{root}/"))
        })
    }
}
