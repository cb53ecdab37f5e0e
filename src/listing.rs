use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::error::FetchError;
use crate::fingerprint::Fingerprint;

/// One entry of a branch directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseItem {
    pub name: String,
    pub mod_time: DateTime<FixedOffset>,
}

/// A fetched listing in server order, plus its fingerprint
#[derive(Debug, Clone)]
pub struct Listing {
    pub items: Vec<ReleaseItem>,
    pub fingerprint: Fingerprint,
}

impl Listing {
    pub fn new(items: Vec<ReleaseItem>) -> Self {
        let fingerprint = Fingerprint::of(&items);
        Listing { items, fingerprint }
    }

    /// Parse a JSON listing body. Unknown per-item fields are ignored.
    pub fn from_json(body: &[u8]) -> Result<Self, FetchError> {
        let items: Vec<ReleaseItem> = serde_json::from_slice(body)?;
        Ok(Listing::new(items))
    }

    /// Newest item by `mod_time`. On ties the first one in listing order wins.
    pub fn newest(&self) -> Option<&ReleaseItem> {
        let mut items = self.items.iter();
        let mut latest = items.next()?;
        for item in items {
            if item.mod_time > latest.mod_time {
                latest = item;
            }
        }
        Some(latest)
    }
}

/// Source of branch listings
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch(&self, branch: Branch) -> Result<Listing, FetchError>;
}

/// Fetches `{base_url}/{branch}/` as JSON over HTTP
pub struct HttpListingSource {
    client: Client,
    base_url: String,
}

impl HttpListingSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn branch_url(&self, branch: Branch) -> String {
        format!("{}/{}/", self.base_url, branch)
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch(&self, branch: Branch) -> Result<Listing, FetchError> {
        let url = self.branch_url(branch);
        tracing::debug!("Fetching listing from {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let listing = Listing::from_json(&body)?;
        tracing::debug!(
            "Fetched {} item(s) for {} (fingerprint {})",
            listing.items.len(),
            branch,
            listing.fingerprint.short()
        );
        Ok(listing)
    }
}
