use std::path::PathBuf;

use thiserror::Error;

/// Failure reaching or reading the upstream listing
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("malformed listing payload: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Per-target delivery failure
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request to {repo} failed: {source}")]
    Transport {
        repo: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{repo} rejected dispatch with status {status}: {body}")]
    Rejected {
        repo: String,
        status: u16,
        body: String,
    },
}

/// State file could not be read, parsed or written
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unrecognised state file format in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Failure of one branch check
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("state save task failed: {0}")]
    SaveTask(#[from] tokio::task::JoinError),
}
