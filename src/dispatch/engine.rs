use std::fmt;
use std::sync::Arc;

use super::notifier::{DispatchRequest, Notifier, Target};
use crate::branch::Branch;
use crate::listing::Listing;
use crate::storage::BranchState;

/// Result of reconciling one fetched listing against stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Fingerprint already handled; no network calls made
    Unchanged,
    /// Listing changed but holds no items; fingerprint recorded, nothing sent
    NoItems,
    /// At least one target holds the current version
    Dispatched { succeeded: usize, failed: usize },
    /// Every target failed; the change will be retried in full
    DispatchFailed { failed: usize },
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Unchanged => write!(f, "unchanged"),
            ReconcileOutcome::NoItems => write!(f, "no items"),
            ReconcileOutcome::Dispatched { succeeded, failed } => {
                write!(f, "dispatched ({} succeeded, {} failed)", succeeded, failed)
            }
            ReconcileOutcome::DispatchFailed { failed } => {
                write!(f, "dispatch failed ({} failed)", failed)
            }
        }
    }
}

/// Decides whether a listing needs dispatching and drives delivery
pub struct DispatchEngine {
    notifier: Arc<dyn Notifier>,
    base_url: String,
}

impl DispatchEngine {
    pub fn new(notifier: Arc<dyn Notifier>, base_url: &str) -> Self {
        Self {
            notifier,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Download reference for an item of a branch listing
    pub fn download_url(&self, branch: Branch, name: &str) -> String {
        format!("{}/{}/{}", self.base_url, branch, name)
    }

    /// Reconcile `listing` against `state`, notifying every target that has
    /// not yet received this fingerprint.
    ///
    /// Each pending target is attempted exactly once; failures never abort the
    /// loop. `last_fingerprint` only advances when at least one target holds
    /// the version, so a round where everything failed is retried in full.
    /// A stored fingerprint whose dispatch log lacks some configured target is
    /// retried for those targets only.
    pub async fn reconcile(
        &self,
        branch: Branch,
        listing: &Listing,
        state: &BranchState,
        targets: &[Target],
    ) -> (BranchState, ReconcileOutcome) {
        let fingerprint = &listing.fingerprint;
        let mut updated = state.clone();

        if state.is_current(fingerprint) {
            match state.dispatched_for(fingerprint) {
                None => return (updated, ReconcileOutcome::Unchanged),
                Some(done) if targets.iter().all(|t| done.contains(&t.repo)) => {
                    return (updated, ReconcileOutcome::Unchanged);
                }
                Some(_) => {
                    tracing::info!(
                        "Retrying pending targets for {} at {}",
                        branch,
                        fingerprint.short()
                    );
                }
            }
        }

        let Some(latest) = listing.newest() else {
            tracing::info!("Listing for {} is empty, nothing to dispatch", branch);
            updated.last_fingerprint = Some(fingerprint.clone());
            return (updated, ReconcileOutcome::NoItems);
        };

        let request = DispatchRequest {
            ipa_url: self.download_url(branch, &latest.name),
            is_testflight: branch.is_testflight(),
        };
        tracing::info!("New version found in {}: {}", branch, request.ipa_url);

        let mut succeeded = 0;
        let mut failed_repos = Vec::new();

        for target in targets {
            if state.is_dispatched(fingerprint, &target.repo) {
                tracing::debug!(
                    "Skipping {} for {}: already dispatched for current version",
                    target.repo,
                    branch
                );
                succeeded += 1;
                continue;
            }

            tracing::debug!("Dispatching {} update to {}", branch, target.repo);
            match self.notifier.notify(target, &request).await {
                Ok(()) => {
                    tracing::info!("Dispatched {} workflow to {}", branch, target.repo);
                    updated.record_dispatch(fingerprint, &target.repo);
                    succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to dispatch {} to {}: {}", branch, target.repo, e);
                    failed_repos.push(target.repo.as_str());
                }
            }
        }

        let failed = failed_repos.len();
        if failed > 0 {
            tracing::warn!(
                "Failed to dispatch {} to {} repositories: {:?}",
                branch,
                failed,
                failed_repos
            );
        }

        if succeeded == 0 {
            return (updated, ReconcileOutcome::DispatchFailed { failed });
        }

        updated.last_fingerprint = Some(fingerprint.clone());
        (updated, ReconcileOutcome::Dispatched { succeeded, failed })
    }
}
