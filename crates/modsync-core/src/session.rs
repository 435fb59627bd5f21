//! One sync attempt, start to finish
//!
//! ```text
//! Idle -> FetchingRemoteState -> Diffing -+-> NoChanges -> Idle
//!                                         |
//!                                         +-> PlanReady -> AwaitingConfirmation | SilentApply
//!                                                                   |
//!                                                              Transferring
//!                                                                   |
//!           +---------------------------+---------------------------+
//!           |                           |                           |
//!        Success                    Cancelled                  FatalError
//!           |                           |                           |
//!  CommitAndMaybeRestart         RollbackStaging              ReportAndAbort
//!           |                           |                           |
//!          Idle                        Idle                        Idle
//! ```
//!
//! The session owns everything an attempt needs (settings, persisted state,
//! the remote, the cancellation token), so nothing is process-global.

use std::sync::Arc;

use modsync_fs::{ContentHasher, NormalizedPath};
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogTarget;
use crate::{
    CatalogBuilder, ClientSettings, DataDir, Error, ExclusionMatcher, ExclusionSet, FileSource,
    PersistedSyncState, PlanOptions, RemoteSource, Result, SyncLock, SyncPathSpec, SyncPlanSet,
    TransferFailure, TransferManager, TransferOutcome, TransferProgress, TransferReport, plan,
};

/// Where an attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Idle,
    FetchingRemoteState,
    Diffing,
    NoChanges,
    PlanReady,
    AwaitingConfirmation,
    SilentApply,
    Transferring,
    Success,
    CommitAndMaybeRestart,
    Cancelled,
    RollbackStaging,
    FatalError,
    ReportAndAbort,
}

impl SyncPhase {
    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(self, next: SyncPhase) -> bool {
        use SyncPhase::*;

        if next == FatalError {
            return !matches!(self, Idle | FatalError | ReportAndAbort);
        }

        matches!(
            (self, next),
            (Idle, FetchingRemoteState)
                | (FetchingRemoteState, Diffing)
                | (Diffing, NoChanges)
                | (Diffing, PlanReady)
                | (NoChanges, Idle)
                | (PlanReady, AwaitingConfirmation)
                | (PlanReady, SilentApply)
                | (AwaitingConfirmation, Transferring)
                | (AwaitingConfirmation, Idle)
                | (SilentApply, Transferring)
                | (Transferring, Success)
                | (Transferring, Cancelled)
                | (Success, CommitAndMaybeRestart)
                | (CommitAndMaybeRestart, Idle)
                | (Cancelled, RollbackStaging)
                | (RollbackStaging, Idle)
                | (FatalError, ReportAndAbort)
                | (ReportAndAbort, Idle)
        )
    }
}

/// Result of the fetch-and-diff half of an attempt.
#[derive(Debug, Clone)]
pub struct SyncCheck {
    pub server_version: String,
    pub plans: SyncPlanSet,
}

/// How the apply half of an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Everything was applied and committed.
    Applied {
        report: TransferReport,
        /// Staged files and removals are waiting for the external updater
        restart_required: bool,
    },
    /// The user declined and nothing was enforced.
    Declined,
    /// The batch stopped early and staging was rolled back.
    ///
    /// `in_place` files were already written to the live tree and stay there.
    Cancelled {
        completed: usize,
        in_place: usize,
        failures: Vec<TransferFailure>,
    },
}

/// Drives one sync attempt at a time against a [`RemoteSource`].
pub struct SyncSession<R> {
    remote: Arc<R>,
    root: NormalizedPath,
    state: PersistedSyncState,
    settings: ClientSettings,
    client_version: String,
    hasher: ContentHasher,
    phase: SyncPhase,
    cancel: CancellationToken,
    progress: TransferProgress,
}

impl<R: RemoteSource + 'static> SyncSession<R> {
    pub fn new(
        remote: Arc<R>,
        root: NormalizedPath,
        settings: ClientSettings,
        client_version: impl Into<String>,
    ) -> Self {
        let state = PersistedSyncState::new(DataDir::for_root(&root));
        let hasher = ContentHasher::default().with_retry(settings.retry);
        Self {
            remote,
            root,
            state,
            settings,
            client_version: client_version.into(),
            hasher,
            phase: SyncPhase::Idle,
            cancel: CancellationToken::new(),
            progress: TransferProgress::new(),
        }
    }

    /// Use a data directory other than `<root>/ModSync_Data`.
    pub fn with_data_dir(mut self, layout: DataDir) -> Self {
        self.state = PersistedSyncState::new(layout);
        self
    }

    pub fn with_hasher(mut self, hasher: ContentHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn state(&self) -> &PersistedSyncState {
        &self.state
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Token that cancels the running transfer when raised.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Counters of the most recent transfer.
    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    fn transition(&mut self, next: SyncPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(from = ?self.phase, to = ?next, "Sync phase");
        self.phase = next;
        Ok(())
    }

    /// Walk the failure path back to idle and hand the error on.
    fn abort(&mut self, err: Error) -> Error {
        tracing::error!("Sync failed: {}", err);
        if self.phase.can_transition_to(SyncPhase::FatalError) {
            self.phase = SyncPhase::FatalError;
        }
        self.phase = SyncPhase::ReportAndAbort;
        self.phase = SyncPhase::Idle;
        err
    }

    /// Fetch remote state, catalogue local files and plan.
    ///
    /// Ends in [`SyncPhase::Idle`] when there is nothing to do (the snapshot
    /// is still refreshed), otherwise in [`SyncPhase::AwaitingConfirmation`]
    /// or [`SyncPhase::SilentApply`].
    pub async fn check(&mut self) -> Result<SyncCheck> {
        self.transition(SyncPhase::FetchingRemoteState)?;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        if self.state.has_pending_update() {
            tracing::warn!(
                "Found a previous update that was not applied; the updater may have failed. Attempting to continue"
            );
        }

        let fetched = match self.fetch_remote_state().await {
            Ok(fetched) => fetched,
            Err(e) => return Err(self.abort(e)),
        };

        self.transition(SyncPhase::Diffing)?;
        let plans = match self.diff(&fetched).await {
            Ok(plans) => plans,
            Err(e) => return Err(self.abort(e)),
        };

        tracing::info!(
            total = plans.update_count(),
            added = plans.added_count(),
            updated = plans.updated_count(),
            removed = plans.removed_count(),
            "Compared local files with server"
        );

        if plans.is_empty() {
            self.transition(SyncPhase::NoChanges)?;
            if let Err(e) = self.state.commit(plans.remote(), &[]) {
                return Err(self.abort(e));
            }
            self.transition(SyncPhase::Idle)?;
        } else {
            self.transition(SyncPhase::PlanReady)?;
            if plans.is_silent(self.settings.headless) {
                self.transition(SyncPhase::SilentApply)?;
            } else {
                self.transition(SyncPhase::AwaitingConfirmation)?;
            }
        }

        Ok(SyncCheck {
            server_version: fetched.version,
            plans,
        })
    }

    /// The user turned the plan down.
    ///
    /// Enforced changes are applied regardless; if there are none the
    /// attempt ends without touching anything.
    pub async fn decline(&mut self, plans: &SyncPlanSet) -> Result<SyncOutcome> {
        let enforced = plans.enforced_only();
        if enforced.is_empty() {
            self.transition(SyncPhase::Idle)?;
            tracing::info!("Optional updates declined");
            return Ok(SyncOutcome::Declined);
        }
        self.apply(&enforced).await
    }

    /// Download, commit and clean up.
    ///
    /// # Errors
    ///
    /// Fails without downloading anything if another sync holds the lock or
    /// a previous attempt's staging directory is still present.
    pub async fn apply(&mut self, plans: &SyncPlanSet) -> Result<SyncOutcome> {
        let lock = match self.enter_transfer() {
            Ok(lock) => lock,
            Err(e @ Error::InvalidTransition { .. }) => return Err(e),
            Err(e) => return Err(self.abort(e)),
        };

        let manager = TransferManager::new(self.root.clone(), self.state.layout().staging())
            .with_concurrency(self.settings.download_concurrency)
            .with_retry(self.settings.retry);
        self.progress = manager.progress().clone();

        let source: Arc<dyn FileSource> = self.remote.clone();
        let outcome = manager.execute(plans, source, self.cancel.clone()).await;

        let result = match outcome {
            Ok(TransferOutcome::Completed(report)) => self.finish(plans, report),
            Ok(TransferOutcome::Cancelled {
                completed,
                in_place,
                failures,
            }) => self.roll_back(completed, in_place, failures),
            Err(e) => Err(self.abort(e)),
        };

        drop(lock);
        result
    }

    fn enter_transfer(&mut self) -> Result<SyncLock> {
        if !self.phase.can_transition_to(SyncPhase::Transferring) {
            return Err(Error::InvalidTransition {
                from: self.phase,
                to: SyncPhase::Transferring,
            });
        }

        let lock = SyncLock::acquire(self.state.layout())?;
        if self.state.staging_exists() {
            return Err(Error::StagingInFlight {
                path: self.state.layout().staging().to_native(),
            });
        }

        self.transition(SyncPhase::Transferring)?;
        Ok(lock)
    }

    fn finish(&mut self, plans: &SyncPlanSet, report: TransferReport) -> Result<SyncOutcome> {
        self.transition(SyncPhase::Success)?;
        self.transition(SyncPhase::CommitAndMaybeRestart)?;

        let removed = plans.removed_files();
        if let Err(e) = self.state.commit(plans.remote(), &removed) {
            return Err(self.abort(e));
        }

        // Removals are carried out by the updater as well.
        let restart_required = plans.requires_restart() || !removed.is_empty();
        if !restart_required && let Err(e) = self.state.clear_staging() {
            return Err(self.abort(e));
        }

        if restart_required {
            tracing::info!("Update staged, restart to apply it");
        }
        self.transition(SyncPhase::Idle)?;
        Ok(SyncOutcome::Applied {
            report,
            restart_required,
        })
    }

    fn roll_back(
        &mut self,
        completed: usize,
        in_place: usize,
        failures: Vec<TransferFailure>,
    ) -> Result<SyncOutcome> {
        self.transition(SyncPhase::Cancelled)?;
        self.transition(SyncPhase::RollbackStaging)?;

        if let Err(e) = self.state.clear_staging() {
            return Err(self.abort(e));
        }

        self.transition(SyncPhase::Idle)?;
        Ok(SyncOutcome::Cancelled {
            completed,
            in_place,
            failures,
        })
    }

    async fn fetch_remote_state(&self) -> Result<FetchedState> {
        let version = self.remote.version().await?;
        tracing::info!(server = %version, "Found server version");
        if version != self.client_version {
            tracing::warn!(
                server = %version,
                client = %self.client_version,
                "Server version does not match client version, sync may not work as expected"
            );
        }

        let specs = self.remote.sync_paths().await?;
        for spec in &specs {
            spec.validate_location()?;
        }

        let exclusions = ExclusionSet::compile(self.remote.exclusions().await?)?;
        let enabled: Vec<SyncPathSpec> = specs
            .into_iter()
            .filter(|spec| self.settings.is_enabled(spec))
            .collect();

        let requested: Vec<String> = enabled.iter().map(|s| s.path.clone()).collect();
        let remote = self.remote.hashes(&requested).await?;

        Ok(FetchedState {
            version,
            enabled,
            exclusions: Arc::new(exclusions),
            remote,
        })
    }

    async fn diff(&self, fetched: &FetchedState) -> Result<SyncPlanSet> {
        let previous = self.state.load_previous()?;
        let local_exclusions = Arc::new(ExclusionSet::compile(
            self.state.load_local_exclusions(self.settings.headless)?,
        )?);

        let targets: Vec<CatalogTarget> = fetched
            .enabled
            .iter()
            .map(|spec| {
                let mut matcher = ExclusionMatcher::global(&self.root, fetched.exclusions.clone());
                if !spec.enforced {
                    matcher = matcher.with_set(local_exclusions.clone());
                }
                CatalogTarget::new(spec.path.clone(), matcher)
            })
            .collect();

        let local = CatalogBuilder::new(self.root.clone())
            .with_hasher(self.hasher)
            .with_concurrency(self.settings.hash_concurrency)
            .build(&targets)
            .await?;
        self.state.save_local_hashes(&local)?;

        let options = PlanOptions {
            delete_removed_files: self.settings.delete_removed_files,
            local_exclusions,
        };
        Ok(plan(&local, &fetched.remote, &previous, &fetched.enabled, &options))
    }
}

struct FetchedState {
    version: String,
    enabled: Vec<SyncPathSpec>,
    exclusions: Arc<ExclusionSet>,
    remote: crate::CatalogSet,
}
