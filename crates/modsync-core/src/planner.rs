//! Three-way sync planning
//!
//! Each sync path is planned by comparing three catalogs: what is on disk
//! locally, what the server serves now, and what the server served at the
//! last successful sync. The third one is what makes removal safe: a local
//! file is only ever removed if this tool put it there.
//!
//! Planning is pure. All I/O happens before (catalog building) and after
//! (transfers, state commit).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::{CatalogSet, ExclusionSet, PathCatalog, SyncPathSpec};

/// Client-side knobs that change the plan.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Remove files the server dropped, for paths that are not enforced
    pub delete_removed_files: bool,
    /// Operator exclusions applied to remote catalogs of optional paths
    pub local_exclusions: Arc<ExclusionSet>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            delete_removed_files: true,
            local_exclusions: Arc::new(ExclusionSet::empty()),
        }
    }
}

impl PlanOptions {
    /// Whether removals are applied for `spec`.
    pub fn removals_active(&self, spec: &SyncPathSpec) -> bool {
        spec.enforced || self.delete_removed_files
    }
}

/// Changes for one sync path. The four lists are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    pub spec: SyncPathSpec,
    /// On the server, not on disk
    pub added: Vec<String>,
    /// On both, with different content
    pub updated: Vec<String>,
    /// Previously synced, still on disk, gone from the server
    pub removed: Vec<String>,
    /// Empty directories on the server, missing on disk
    pub created_directories: Vec<String>,
}

impl SyncPlan {
    pub fn new(spec: SyncPathSpec) -> Self {
        Self {
            spec,
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            created_directories: Vec::new(),
        }
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len() + self.created_directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    /// Files that have to be fetched from the server.
    pub fn downloads(&self) -> impl Iterator<Item = &str> {
        self.added.iter().chain(&self.updated).map(String::as_str)
    }

    fn cleared(&self) -> Self {
        Self::new(self.spec.clone())
    }
}

/// Plans for every sync path of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlanSet {
    plans: Vec<SyncPlan>,
    remote: CatalogSet,
}

impl SyncPlanSet {
    pub fn plans(&self) -> &[SyncPlan] {
        &self.plans
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncPlan> {
        self.plans.iter()
    }

    /// The remote catalogs the plans were computed against, after local
    /// exclusions. This is what gets persisted once the plans are applied.
    pub fn remote(&self) -> &CatalogSet {
        &self.remote
    }

    /// Total number of changes, counting each created directory once.
    pub fn update_count(&self) -> usize {
        self.plans.iter().map(SyncPlan::change_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.update_count() == 0
    }

    pub fn added_count(&self) -> usize {
        self.plans.iter().map(|p| p.added.len()).sum()
    }

    pub fn updated_count(&self) -> usize {
        self.plans.iter().map(|p| p.updated.len()).sum()
    }

    pub fn removed_count(&self) -> usize {
        self.plans.iter().map(|p| p.removed.len()).sum()
    }

    pub fn download_count(&self) -> usize {
        self.plans.iter().map(|p| p.downloads().count()).sum()
    }

    /// No confirmation needed: the client is headless, or every path with
    /// changes is marked silent.
    pub fn is_silent(&self, headless: bool) -> bool {
        headless || self.plans.iter().all(|p| p.spec.silent || p.is_empty())
    }

    /// Any change lands in a path that needs the external updater.
    pub fn requires_restart(&self) -> bool {
        self.plans
            .iter()
            .any(|p| p.spec.restart_required && !p.is_empty())
    }

    /// Any change lands in an enforced path.
    pub fn has_enforced_changes(&self) -> bool {
        self.plans.iter().any(|p| p.spec.enforced && !p.is_empty())
    }

    /// Any change lands in an optional path.
    pub fn has_optional_changes(&self) -> bool {
        self.plans.iter().any(|p| !p.spec.enforced && !p.is_empty())
    }

    /// What still gets applied when the user declines optional updates.
    ///
    /// Optional paths are emptied and dropped from the remote catalog, so
    /// their previous snapshot survives the commit untouched.
    pub fn enforced_only(&self) -> Self {
        let mut remote = CatalogSet::new();
        let plans = self
            .plans
            .iter()
            .map(|plan| {
                if plan.spec.enforced {
                    if let Some(catalog) = self.remote.get(&plan.spec.path) {
                        remote.insert(&plan.spec.path, catalog.clone());
                    }
                    plan.clone()
                } else {
                    plan.cleared()
                }
            })
            .collect();
        Self { plans, remote }
    }

    /// Every path slated for removal, across sync paths.
    pub fn removed_files(&self) -> Vec<String> {
        self.plans
            .iter()
            .flat_map(|p| p.removed.iter().cloned())
            .collect()
    }

    /// Human-readable change list split into optional and enforced groups.
    pub fn describe(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for plan in &self.plans {
            let lines = plan
                .added
                .iter()
                .map(|f| format!("ADDED {f}"))
                .chain(plan.updated.iter().map(|f| format!("UPDATED {f}")))
                .chain(plan.removed.iter().map(|f| format!("REMOVED {f}")))
                .chain(plan.created_directories.iter().map(|d| format!("CREATED {d}/")));
            if plan.spec.enforced {
                summary.enforced.extend(lines);
            } else {
                summary.optional.extend(lines);
            }
        }
        summary
    }
}

/// Change lines for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub optional: Vec<String>,
    pub enforced: Vec<String>,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.optional.is_empty() {
            write!(f, "{}", self.optional.join("\n"))?;
        }
        if !self.optional.is_empty() && !self.enforced.is_empty() {
            write!(f, "\n\n")?;
        }
        if !self.enforced.is_empty() {
            write!(f, "[Enforced]\n{}", self.enforced.join("\n"))?;
        }
        Ok(())
    }
}

/// Diff `local` against `remote` and `previous` for each sync path in `specs`.
///
/// `specs` is the list of sync paths enabled for this attempt.
pub fn plan(
    local: &CatalogSet,
    remote: &CatalogSet,
    previous: &CatalogSet,
    specs: &[SyncPathSpec],
    options: &PlanOptions,
) -> SyncPlanSet {
    let empty = PathCatalog::new();
    let mut set = SyncPlanSet::default();

    for spec in specs {
        let remote_catalog = effective_remote(remote.get(&spec.path).unwrap_or(&empty), spec, options);
        let local_catalog = local.get(&spec.path).unwrap_or(&empty);
        let previous_catalog = previous.get(&spec.path).unwrap_or(&empty);

        let plan = diff(
            spec,
            local_catalog,
            &remote_catalog,
            previous_catalog,
            options.removals_active(spec),
        );
        tracing::debug!(
            path = %spec.path,
            added = plan.added.len(),
            updated = plan.updated.len(),
            removed = plan.removed.len(),
            created = plan.created_directories.len(),
            "Planned sync path"
        );

        set.remote.insert(&spec.path, remote_catalog);
        set.plans.push(plan);
    }

    set
}

/// Remote catalog after the operator's local exclusions.
/// Enforced paths are never filtered.
fn effective_remote(catalog: &PathCatalog, spec: &SyncPathSpec, options: &PlanOptions) -> PathCatalog {
    let mut filtered = catalog.clone();
    if !spec.enforced && !options.local_exclusions.is_empty() {
        filtered.retain(|path, _| !options.local_exclusions.matches_prefix(path));
    }
    filtered
}

fn diff(
    spec: &SyncPathSpec,
    local: &PathCatalog,
    remote: &PathCatalog,
    previous: &PathCatalog,
    removals_active: bool,
) -> SyncPlan {
    let mut plan = SyncPlan::new(spec.clone());

    for (path, remote_record) in remote.iter() {
        match local.get(path) {
            Some(local_record) => {
                let differs = local_record.is_directory || local_record.hash != remote_record.hash;
                if !remote_record.is_directory && differs {
                    plan.updated.push(path.to_string());
                }
            }
            None if remote_record.is_directory => {
                if !local.has_descendant(path) {
                    plan.created_directories.push(path.to_string());
                }
            }
            None => plan.added.push(path.to_string()),
        }
    }

    if removals_active {
        for (path, local_record) in local.iter() {
            if remote.contains(path) || !previous.contains(path) {
                continue;
            }
            // An empty directory that the server has since filled is not gone.
            if local_record.is_directory && remote.has_descendant(path) {
                continue;
            }
            plan.removed.push(path.to_string());
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModFileRecord;
    use modsync_fs::Fingerprint;
    use pretty_assertions::assert_eq;

    fn catalog(entries: &[(&str, &str)]) -> PathCatalog {
        entries
            .iter()
            .map(|(path, hash)| {
                let record = if hash.is_empty() {
                    ModFileRecord::directory()
                } else {
                    ModFileRecord::file(Fingerprint::new(*hash))
                };
                (path.to_string(), record)
            })
            .collect()
    }

    fn single(path: &str, entries: &[(&str, &str)]) -> CatalogSet {
        let mut set = CatalogSet::new();
        set.insert(path, catalog(entries));
        set
    }

    #[test]
    fn unchanged_files_are_not_planned() {
        let spec = SyncPathSpec::new("p");
        let same = single("p", &[("p/a", "H1")]);
        let plans = plan(&same, &same, &same, &[spec], &PlanOptions::default());
        assert!(plans.is_empty());
    }

    #[test]
    fn local_directory_shadowing_a_remote_file_is_an_update() {
        let spec = SyncPathSpec::new("p");
        let local = single("p", &[("p/a", "")]);
        let remote = single("p", &[("p/a", "H1")]);
        let plans = plan(&local, &remote, &CatalogSet::new(), &[spec], &PlanOptions::default());
        assert_eq!(plans.plans()[0].updated, vec!["p/a"]);
    }

    #[test]
    fn created_directory_is_skipped_when_local_has_content_there() {
        let spec = SyncPathSpec::new("p");
        let local = single("p", &[("p/dir/file", "H1")]);
        let remote = single("p", &[("p/dir", ""), ("p/new", "")]);
        let plans = plan(&local, &remote, &CatalogSet::new(), &[spec], &PlanOptions::default());
        assert_eq!(plans.plans()[0].created_directories, vec!["p/new"]);
    }

    #[test]
    fn summary_groups_enforced_changes() {
        let optional = SyncPathSpec::new("o");
        let enforced = SyncPathSpec::new("e").enforced(true);
        let mut remote = single("o", &[("o/a", "H1"), ("o/d", "")]);
        remote.insert("e", catalog(&[("e/b", "H2")]));

        let plans = plan(
            &CatalogSet::new(),
            &remote,
            &CatalogSet::new(),
            &[optional, enforced],
            &PlanOptions::default(),
        );

        assert_eq!(
            plans.describe().to_string(),
            "ADDED o/a\nCREATED o/d/\n\n[Enforced]\nADDED e/b"
        );
    }

    #[test]
    fn enforced_only_keeps_previous_snapshot_for_declined_paths() {
        let optional = SyncPathSpec::new("o");
        let enforced = SyncPathSpec::new("e").enforced(true);
        let mut remote = single("o", &[("o/a", "H1")]);
        remote.insert("e", catalog(&[("e/b", "H2")]));

        let plans = plan(
            &CatalogSet::new(),
            &remote,
            &CatalogSet::new(),
            &[optional, enforced],
            &PlanOptions::default(),
        );
        let reduced = plans.enforced_only();

        assert_eq!(reduced.update_count(), 1);
        assert!(reduced.remote().get("o").is_none());
        assert!(reduced.remote().get("e").is_some());
        assert!(!reduced.has_optional_changes());
    }

    #[test]
    fn silent_and_restart_flags_only_consider_paths_with_changes() {
        let loud_but_idle = SyncPathSpec::new("idle");
        let silent = SyncPathSpec::new("s").silent(true).restart_required(false);
        let remote = single("s", &[("s/a", "H1")]);

        let plans = plan(
            &CatalogSet::new(),
            &remote,
            &CatalogSet::new(),
            &[loud_but_idle, silent],
            &PlanOptions::default(),
        );

        assert!(plans.is_silent(false));
        assert!(!plans.requires_restart());
    }
}
