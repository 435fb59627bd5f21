//! Executes the download side of a plan

use std::path::PathBuf;
use std::sync::Arc;

use modsync_fs::{NormalizedPath, RetryPolicy, io, sanitize_relative};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{ConcurrencyLimiter, DOWNLOAD_CONCURRENCY, TransferProgress};
use crate::{Error, FileSource, Result, SyncPlanSet};

/// Counts for a batch that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub downloaded: usize,
    /// Written to the staging area for the external updater
    pub staged: usize,
    /// Written straight into the live tree
    pub in_place: usize,
    pub directories_created: usize,
}

/// A unit of work that gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFailure {
    pub path: String,
    pub error: String,
}

/// How a batch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed(TransferReport),
    /// The batch stopped early. Staged files are left where they are.
    Cancelled {
        completed: usize,
        /// Completed units that already replaced a live file
        in_place: usize,
        failures: Vec<TransferFailure>,
    },
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug, Clone)]
struct Unit {
    relative: String,
    destination: PathBuf,
    staged: bool,
}

/// Downloads the added and updated files of a plan set.
///
/// Paths flagged `restartRequired` are written below the staging root,
/// mirroring the live layout; everything else is replaced in place.
#[derive(Debug, Clone)]
pub struct TransferManager {
    live_root: NormalizedPath,
    staging_root: NormalizedPath,
    limiter: ConcurrencyLimiter,
    retry: RetryPolicy,
}

impl TransferManager {
    pub fn new(live_root: NormalizedPath, staging_root: NormalizedPath) -> Self {
        Self {
            live_root,
            staging_root,
            limiter: ConcurrencyLimiter::new(DOWNLOAD_CONCURRENCY),
            retry: RetryPolicy::default(),
        }
    }

    /// Cap on concurrent downloads.
    pub fn with_concurrency(mut self, capacity: usize) -> Self {
        self.limiter = ConcurrencyLimiter::new(capacity);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn progress(&self) -> &TransferProgress {
        self.limiter.progress()
    }

    pub fn staging_root(&self) -> &NormalizedPath {
        &self.staging_root
    }

    /// Run every download in `plans`.
    ///
    /// Raising `cancel` stops new units from starting; units already running
    /// finish or stop at their next retry. A unit that fails permanently, or
    /// runs out of retries, raises `cancel` itself so the rest of the batch
    /// stops too.
    ///
    /// # Errors
    ///
    /// Returns an error before anything is downloaded if the plan names a
    /// path outside the install root.
    pub async fn execute(
        &self,
        plans: &SyncPlanSet,
        source: Arc<dyn FileSource>,
        cancel: CancellationToken,
    ) -> Result<TransferOutcome> {
        let units = self.units(plans)?;
        let directories_created = self.create_directories(plans);
        let progress = self.progress().clone();
        progress.begin_batch(units.len());

        let staged = units.iter().filter(|u| u.staged).count();
        let in_place = units.len() - staged;
        tracing::info!(files = units.len(), staged, in_place, "Starting downloads");

        let mut handles = Vec::with_capacity(units.len());
        for unit in units {
            let guard = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                guard = self.limiter.acquire() => guard?,
            };

            let source = source.clone();
            let cancel = cancel.clone();
            let retry = self.retry;
            let progress = progress.clone();
            let relative = unit.relative.clone();
            let staged = unit.staged;
            let handle = tokio::spawn(async move {
                let _guard = guard;
                let result = run_unit(source.as_ref(), &unit, retry, &cancel).await;
                match &result {
                    Ok(()) => progress.record_completed(),
                    Err(Error::Cancelled) => {}
                    Err(_) => progress.record_failed(),
                }
                result
            });
            handles.push((relative, staged, handle));
        }

        let mut completed = 0;
        let mut written_in_place = 0;
        let mut failures = Vec::new();
        for (relative, staged, handle) in handles {
            match handle.await {
                Ok(Ok(())) => {
                    completed += 1;
                    if !staged {
                        written_in_place += 1;
                    }
                }
                Ok(Err(Error::Cancelled)) => {}
                Ok(Err(e)) => failures.push(TransferFailure {
                    path: relative,
                    error: e.to_string(),
                }),
                Err(join) => {
                    cancel.cancel();
                    failures.push(TransferFailure {
                        path: relative,
                        error: join.to_string(),
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::warn!(
                completed,
                in_place = written_in_place,
                failed = failures.len(),
                "Downloads cancelled"
            );
            return Ok(TransferOutcome::Cancelled {
                completed,
                in_place: written_in_place,
                failures,
            });
        }

        tracing::info!(downloaded = completed, "Downloads finished");
        Ok(TransferOutcome::Completed(TransferReport {
            downloaded: completed,
            staged,
            in_place,
            directories_created,
        }))
    }

    fn target_root(&self, restart_required: bool) -> &NormalizedPath {
        if restart_required {
            &self.staging_root
        } else {
            &self.live_root
        }
    }

    fn units(&self, plans: &SyncPlanSet) -> Result<Vec<Unit>> {
        let mut units = Vec::with_capacity(plans.download_count());
        for plan in plans.iter() {
            let root = self.target_root(plan.spec.restart_required);
            for relative in plan.downloads() {
                let clean = sanitize_relative(relative)?;
                units.push(Unit {
                    relative: relative.to_string(),
                    destination: root.join(&clean).to_native(),
                    staged: plan.spec.restart_required,
                });
            }
        }
        Ok(units)
    }

    /// Create empty directories up front. Failures are logged, not fatal.
    fn create_directories(&self, plans: &SyncPlanSet) -> usize {
        let mut created = 0;
        for plan in plans.iter() {
            let root = self.target_root(plan.spec.restart_required);
            for directory in &plan.created_directories {
                let result = sanitize_relative(directory)
                    .map_err(Error::from)
                    .and_then(|clean| {
                        let target = root.join(&clean).to_native();
                        std::fs::create_dir_all(&target)
                            .map_err(|e| Error::from(modsync_fs::Error::io(target, e)))
                    });
                match result {
                    Ok(()) => created += 1,
                    Err(e) => tracing::error!(path = %directory, "Failed to create empty directory: {}", e),
                }
            }
        }
        created
    }
}

async fn run_unit(
    source: &dyn FileSource,
    unit: &Unit,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut retries = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let attempt = async {
            let bytes = source.fetch(&unit.relative).await?;
            let destination = unit.destination.clone();
            tokio::task::spawn_blocking(move || io::replace_file(&destination, &bytes)).await??;
            Ok::<(), Error>(())
        };

        match attempt.await {
            Ok(()) => {
                tracing::debug!(path = %unit.relative, staged = unit.staged, "Downloaded");
                return Ok(());
            }
            Err(e) if e.is_transient() && retries < retry.max_retries => {
                retries += 1;
                tracing::warn!(
                    path = %unit.relative,
                    retry = retries,
                    max_retries = retry.max_retries,
                    "Download failed, retrying: {}",
                    e
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(retry.delay_for(retries)) => {}
                }
            }
            Err(e) => {
                tracing::error!(path = %unit.relative, "Download failed, cancelling batch: {}", e);
                cancel.cancel();
                return Err(e);
            }
        }
    }
}
