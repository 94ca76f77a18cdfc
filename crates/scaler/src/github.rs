//! GitHub REST client for just-in-time runner registration.
//!
//! A jit config is a single-use, time-boxed registration bundle that replaces
//! long-lived registration tokens. The endpoint differs by source kind only
//! in its path segment.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::sources::{Source, SourceType};

/// Pinned GitHub REST API version.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// Default GitHub REST API base.
const DEFAULT_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = "github-runner-scaler";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors from the jit-config exchange. Deliberately terse: callers surface
/// these to HTTP clients and must not leak upstream diagnostics.
#[derive(Error, Debug)]
pub enum GitHubError {
    /// HTTP request failed.
    #[error("failed jit-config request")]
    Http(#[from] reqwest::Error),

    /// GitHub answered with something other than 201.
    #[error("failed jit-config response: status {0}")]
    Api(u16),

    /// 201 response without a usable `encoded_jit_config`.
    #[error("failed jit-config response: missing encoded_jit_config")]
    MissingJitConfig,
}

#[derive(Debug, Serialize)]
struct JitConfigRequest<'a> {
    name: &'a str,
    runner_group_id: i64,
    labels: &'a [String],
    work_folder: &'a str,
}

#[derive(Debug, Deserialize)]
struct JitConfigResponse {
    #[serde(default)]
    encoded_jit_config: String,
}

/// GitHub API client for runner registration.
#[derive(Clone)]
pub struct GitHubClient {
    /// HTTP client.
    client: Client,
    /// API base, overridable for tests.
    api_base: String,
}

impl GitHubClient {
    /// Create a new GitHub client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, GitHubError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the client at an alternate API endpoint.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// The generate-jitconfig endpoint for a source.
    #[must_use]
    pub fn jit_config_endpoint(&self, source: &Source) -> String {
        match source.source_type {
            SourceType::Enterprise => format!(
                "{}/enterprises/{}/actions/runners/generate-jitconfig",
                self.api_base, source.name
            ),
            SourceType::Organization => format!(
                "{}/orgs/{}/actions/runners/generate-jitconfig",
                self.api_base, source.name
            ),
            SourceType::Repository => format!(
                "{}/repos/{}/actions/runners/generate-jitconfig",
                self.api_base, source.name
            ),
        }
    }

    /// Exchange the PAT for a single-use runner registration bundle.
    ///
    /// Success is HTTP 201 with a non-empty `encoded_jit_config`; anything
    /// else is an error. This method never retries - whether to retry is the
    /// caller's decision.
    pub async fn generate_jit_config(
        &self,
        url: &str,
        pat: &str,
        runner_name: &str,
        runner_group_id: i64,
        labels: &[String],
    ) -> Result<String, GitHubError> {
        debug!(
            runner = %runner_name,
            url = %url,
            runner_group_id,
            "Requesting runner jit config"
        );

        let body = JitConfigRequest {
            name: runner_name,
            runner_group_id,
            labels,
            work_folder: "_work",
        };

        let response = self
            .client
            .post(url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {pat}"))
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .header("User-Agent", USER_AGENT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 201 {
            error!(status = %status, "Runner jit-config request unsuccessful");
            return Err(GitHubError::Api(status.as_u16()));
        }

        let payload: JitConfigResponse = response.json().await?;
        if payload.encoded_jit_config.is_empty() {
            error!("Runner jit-config response is empty");
            return Err(GitHubError::MissingJitConfig);
        }

        Ok(payload.encoded_jit_config)
    }
}
