use std::collections::{BTreeMap, BTreeSet};

use crate::branch::Branch;
use crate::fingerprint::Fingerprint;

/// Per-branch change-detection and dispatch bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchState {
    /// Fingerprint at which the last dispatch round with at least one success
    /// completed. `None` until the first one.
    pub last_fingerprint: Option<Fingerprint>,

    /// Fingerprint -> repos already notified successfully for it.
    /// Never pruned.
    pub dispatch_log: BTreeMap<Fingerprint, BTreeSet<String>>,
}

impl BranchState {
    /// Whether `fingerprint` is the one last recorded
    pub fn is_current(&self, fingerprint: &Fingerprint) -> bool {
        self.last_fingerprint.as_ref() == Some(fingerprint)
    }

    pub fn dispatched_for(&self, fingerprint: &Fingerprint) -> Option<&BTreeSet<String>> {
        self.dispatch_log.get(fingerprint)
    }

    pub fn is_dispatched(&self, fingerprint: &Fingerprint, repo: &str) -> bool {
        self.dispatch_log
            .get(fingerprint)
            .is_some_and(|repos| repos.contains(repo))
    }

    pub fn record_dispatch(&mut self, fingerprint: &Fingerprint, repo: &str) {
        self.dispatch_log
            .entry(fingerprint.clone())
            .or_default()
            .insert(repo.to_string());
    }
}

/// Whole contents of the state file, keyed by branch name.
///
/// Keys other than the known branches are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedStore {
    pub branches: BTreeMap<String, BranchState>,
}

impl Default for PersistedStore {
    fn default() -> Self {
        let mut store = PersistedStore {
            branches: BTreeMap::new(),
        };
        store.ensure_known_branches();
        store
    }
}

impl PersistedStore {
    /// Add empty state for any known branch missing from the map
    pub fn ensure_known_branches(&mut self) {
        for branch in Branch::ALL {
            self.branches
                .entry(branch.as_str().to_string())
                .or_default();
        }
    }

    pub fn branch(&self, branch: Branch) -> BranchState {
        self.branches
            .get(branch.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_branch(&mut self, branch: Branch, state: BranchState) {
        self.branches.insert(branch.as_str().to_string(), state);
    }
}
