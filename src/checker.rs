use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::branch::Branch;
use crate::dispatch::{DispatchEngine, Notifier, ReconcileOutcome, Target};
use crate::error::CheckError;
use crate::listing::ListingSource;
use crate::storage::{BranchState, PersistedStore, StateStore};

/// Inputs the checker treats as fixed for its lifetime
#[derive(Debug, Clone)]
pub struct CheckerSettings {
    pub ipa_base_url: String,
    pub targets: Vec<Target>,
    pub branch_delay: Duration,
}

/// One exclusive section per branch
#[derive(Default)]
struct BranchLocks {
    stable: Mutex<()>,
    testflight: Mutex<()>,
}

impl BranchLocks {
    fn get(&self, branch: Branch) -> &Mutex<()> {
        match branch {
            Branch::Stable => &self.stable,
            Branch::Testflight => &self.testflight,
        }
    }
}

/// Fetches, reconciles and persists branch state, one branch at a time.
///
/// Checks of different branches may run concurrently; checks of the same
/// branch are serialized by a per-branch lock held from fetch to persist.
pub struct BranchChecker {
    source: Arc<dyn ListingSource>,
    engine: DispatchEngine,
    store: Arc<dyn StateStore>,
    targets: Vec<Target>,
    branch_delay: Duration,
    /// Last successfully persisted state
    state: Mutex<PersistedStore>,
    locks: BranchLocks,
}

impl BranchChecker {
    /// Create a checker, loading (or creating) the persisted state
    pub fn new(
        source: Arc<dyn ListingSource>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn StateStore>,
        settings: CheckerSettings,
    ) -> Result<Self, CheckError> {
        let state = store.load()?;
        Ok(Self {
            source,
            engine: DispatchEngine::new(notifier, &settings.ipa_base_url),
            store,
            targets: settings.targets,
            branch_delay: settings.branch_delay,
            state: Mutex::new(state),
            locks: BranchLocks::default(),
        })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Snapshot of the persisted state of one branch
    pub async fn branch_state(&self, branch: Branch) -> BranchState {
        self.state.lock().await.branch(branch)
    }

    /// Check one branch: fetch, reconcile, and persist if anything changed.
    ///
    /// A fetch failure leaves state untouched. A failed save leaves the
    /// in-memory state at its last persisted value.
    pub async fn check_branch(&self, branch: Branch) -> Result<ReconcileOutcome, CheckError> {
        let _guard = self.locks.get(branch).lock().await;
        tracing::info!("Checking {} branch...", branch);

        let listing = match self.source.fetch(branch).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::error!(branch = %branch, error = %e, "Error fetching IPA list");
                return Err(e.into());
            }
        };

        let previous = self.branch_state(branch).await;
        let (updated, outcome) = self
            .engine
            .reconcile(branch, &listing, &previous, &self.targets)
            .await;

        if updated != previous {
            self.persist(branch, updated).await.inspect_err(|e| {
                tracing::error!(branch = %branch, error = %e, "Error saving branch state");
            })?;
        }

        match outcome {
            ReconcileOutcome::DispatchFailed { .. } => tracing::warn!(
                branch = %branch,
                fingerprint = listing.fingerprint.short(),
                outcome = %outcome,
                "Check complete"
            ),
            _ => tracing::info!(
                branch = %branch,
                fingerprint = listing.fingerprint.short(),
                outcome = %outcome,
                "Check complete"
            ),
        }
        Ok(outcome)
    }

    /// Check every branch in order, pausing between branches.
    /// A failing branch never stops the others.
    pub async fn check_all(&self) -> Vec<(Branch, Result<ReconcileOutcome, CheckError>)> {
        let mut results = Vec::with_capacity(Branch::ALL.len());
        for (i, branch) in Branch::ALL.into_iter().enumerate() {
            if i > 0 && !self.branch_delay.is_zero() {
                tokio::time::sleep(self.branch_delay).await;
            }
            results.push((branch, self.check_branch(branch).await));
        }
        results
    }

    /// Save `updated` and commit it in memory only once the save succeeded.
    /// The save runs on the blocking pool since it syncs to disk.
    async fn persist(&self, branch: Branch, updated: BranchState) -> Result<(), CheckError> {
        let mut state = self.state.lock().await;
        let mut candidate = state.clone();
        candidate.set_branch(branch, updated);

        let store = Arc::clone(&self.store);
        let candidate =
            tokio::task::spawn_blocking(move || store.save(&candidate).map(|()| candidate))
                .await??;
        *state = candidate;
        tracing::debug!("Persisted state for {}", branch);
        Ok(())
    }
}
