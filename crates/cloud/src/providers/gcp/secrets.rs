//! Secret Manager API client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::auth::TokenSource;
use super::models::AccessSecretVersionResponse;
use crate::providers::traits::{CloudError, SecretStore};

/// Base URL for the Secret Manager API.
const API_BASE_URL: &str = "https://secretmanager.googleapis.com/v1";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Secret Manager client.
#[derive(Clone)]
pub struct SecretManagerClient {
    /// HTTP client.
    client: Client,
    /// API base, overridable for tests.
    api_base: String,
    /// Access-token source.
    tokens: Arc<TokenSource>,
}

impl SecretManagerClient {
    /// Create a new Secret Manager client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(tokens: Arc<TokenSource>) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_base: API_BASE_URL.to_string(),
            tokens,
        })
    }

    /// Point the client at an alternate API endpoint.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

#[async_trait]
impl SecretStore for SecretManagerClient {
    async fn access_secret_version(&self, name: &str) -> Result<Vec<u8>, CloudError> {
        let url = format!("{}/{}:access", self.api_base, name);
        debug!(secret_version = %name, "Accessing secret version");

        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CloudError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let payload: AccessSecretVersionResponse = response.json().await?;
        Ok(general_purpose::STANDARD.decode(payload.payload.data)?)
    }
}
