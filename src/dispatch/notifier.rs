use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Event type every downstream workflow listens for
pub const EVENT_TYPE: &str = "ipa-update";

/// Maximum number of response body characters kept in a rejection
const BODY_EXCERPT_LEN: usize = 200;

/// A downstream repository and the token used to notify it
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    /// `owner/repo`
    #[serde(rename = "github_repo")]
    pub repo: String,
    #[serde(rename = "github_token")]
    pub token: String,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("repo", &self.repo)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// What a target is told about a new build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    pub ipa_url: String,
    pub is_testflight: bool,
}

#[derive(Serialize)]
struct DispatchBody<'a> {
    event_type: &'a str,
    client_payload: &'a DispatchRequest,
}

/// Delivers a dispatch to one target
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &Target, request: &DispatchRequest) -> Result<(), DispatchError>;
}

/// Sends `repository_dispatch` events through the GitHub REST API
pub struct GitHubNotifier {
    client: Client,
    api_base: String,
}

impl GitHubNotifier {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self::with_client(client, api_base))
    }

    pub fn with_client(client: Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn dispatch_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/dispatches", self.api_base, repo)
    }
}

#[async_trait]
impl Notifier for GitHubNotifier {
    async fn notify(&self, target: &Target, request: &DispatchRequest) -> Result<(), DispatchError> {
        let body = DispatchBody {
            event_type: EVENT_TYPE,
            client_payload: request,
        };

        let response = self
            .client
            .post(self.dispatch_url(&target.repo))
            .header(header::ACCEPT, "application/vnd.github+json")
            .bearer_auth(&target.token)
            .json(&body)
            .send()
            .await
            .map_err(|source| DispatchError::Transport {
                repo: target.repo.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(DispatchError::Rejected {
            repo: target.repo.clone(),
            status: status.as_u16(),
            body: excerpt(&text),
        })
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_LEN).collect()
}
