//! On-disk JSON shapes of the state file.
//!
//! Three shapes are accepted on read and tried in order:
//!
//! - current: `{"branches": {b: {"hash": h, "dispatches": {h: [repo]}}}}`
//!   (also accepted without the `branches` wrapper)
//! - intermediate: `{b: {"hash": h, "dispatched": [repo]}}`
//! - flat: `{b: h}`, where `h` may be `null`
//!
//! Only the current shape is ever written.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{BranchState, PersistedStore};
use crate::fingerprint::Fingerprint;

/// Which shape a decoded file was in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Current,
    Legacy,
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    branches: BTreeMap<String, BranchRecord>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BranchRecord {
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    dispatches: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IntermediateRecord {
    #[serde(default)]
    hash: Option<String>,
    dispatched: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyBranch {
    Record(BranchRecord),
    Intermediate(IntermediateRecord),
    Flat(Option<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoreShape {
    Current(StoreFile),
    Legacy(BTreeMap<String, LegacyBranch>),
}

fn fingerprint_from(hash: Option<String>) -> Option<Fingerprint> {
    hash.filter(|h| !h.is_empty()).map(Fingerprint::new)
}

impl From<BranchRecord> for BranchState {
    fn from(record: BranchRecord) -> Self {
        let dispatch_log: BTreeMap<Fingerprint, BTreeSet<String>> = record
            .dispatches
            .unwrap_or_default()
            .into_iter()
            .map(|(hash, repos)| (Fingerprint::new(hash), repos.into_iter().collect()))
            .collect();
        BranchState {
            last_fingerprint: fingerprint_from(record.hash),
            dispatch_log,
        }
    }
}

impl From<&BranchState> for BranchRecord {
    fn from(state: &BranchState) -> Self {
        let dispatches: BTreeMap<String, Vec<String>> = state
            .dispatch_log
            .iter()
            .map(|(fp, repos)| (fp.as_str().to_string(), repos.iter().cloned().collect()))
            .collect();
        BranchRecord {
            hash: Some(
                state
                    .last_fingerprint
                    .as_ref()
                    .map(|fp| fp.as_str().to_string())
                    .unwrap_or_default(),
            ),
            dispatches: Some(dispatches),
        }
    }
}

impl LegacyBranch {
    fn into_state(self, branch: &str) -> BranchState {
        match self {
            LegacyBranch::Record(record) => record.into(),
            LegacyBranch::Intermediate(record) => {
                let last_fingerprint = fingerprint_from(record.hash);
                let mut dispatch_log = BTreeMap::new();
                match &last_fingerprint {
                    Some(fp) if !record.dispatched.is_empty() => {
                        let repos: BTreeSet<String> = record.dispatched.into_iter().collect();
                        dispatch_log.insert(fp.clone(), repos);
                    }
                    None if !record.dispatched.is_empty() => {
                        tracing::warn!(
                            "Dropping {} dispatched repo(s) for {}: no hash to attach them to",
                            record.dispatched.len(),
                            branch
                        );
                    }
                    _ => {}
                }
                BranchState {
                    last_fingerprint,
                    dispatch_log,
                }
            }
            LegacyBranch::Flat(hash) => BranchState {
                last_fingerprint: fingerprint_from(hash),
                dispatch_log: BTreeMap::new(),
            },
        }
    }
}

/// Decode any accepted shape into the in-memory store
pub fn decode(bytes: &[u8]) -> Result<(PersistedStore, StoreFormat), serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let shape: StoreShape = serde_json::from_value(value)?;
    let (branches, format): (BTreeMap<String, BranchState>, StoreFormat) = match shape {
        StoreShape::Current(file) => (
            file.branches
                .into_iter()
                .map(|(name, record)| (name, record.into()))
                .collect(),
            StoreFormat::Current,
        ),
        StoreShape::Legacy(map) => (
            map.into_iter()
                .map(|(name, legacy)| {
                    let state = legacy.into_state(&name);
                    (name, state)
                })
                .collect(),
            StoreFormat::Legacy,
        ),
    };

    let mut store = PersistedStore { branches };
    store.ensure_known_branches();
    Ok((store, format))
}

/// Encode in the current shape, pretty-printed
pub fn encode(store: &PersistedStore) -> Result<Vec<u8>, serde_json::Error> {
    let file = StoreFile {
        branches: store
            .branches
            .iter()
            .map(|(name, state)| (name.clone(), state.into()))
            .collect(),
    };
    serde_json::to_vec_pretty(&file)
}
