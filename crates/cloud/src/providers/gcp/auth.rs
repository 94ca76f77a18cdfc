//! Access tokens from the instance metadata server.

use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;

use super::models::TokenResponse;
use crate::providers::traits::CloudError;

/// Metadata server base URL (GCE, Cloud Run, GKE).
const METADATA_BASE_URL: &str = "http://metadata.google.internal";

/// Token endpoint for the default service account.
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: u64 = 60;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 access-token source backed by the metadata server.
///
/// Tokens are cached until shortly before expiry. For local runs outside
/// Google Cloud, `GCP_ACCESS_TOKEN` overrides the metadata lookup entirely.
pub struct TokenSource {
    client: Client,
    metadata_base: String,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenSource {
    /// Create a token source talking to the real metadata server.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CloudError> {
        Self::with_metadata_base(METADATA_BASE_URL)
    }

    /// Create a token source against an alternate metadata endpoint.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_metadata_base(base: impl Into<String>) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            metadata_base: base.into(),
            cached: RwLock::new(None),
        })
    }

    /// Create a token source that always yields the given token.
    #[must_use]
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            metadata_base: METADATA_BASE_URL.to_string(),
            cached: RwLock::new(Some(CachedToken {
                token: token.into(),
                // far enough out that it never refreshes
                expires_at: Instant::now() + Duration::from_secs(86_400),
            })),
        }
    }

    /// Get a valid access token, refreshing from the metadata server when the
    /// cached one is close to expiry.
    pub async fn token(&self) -> Result<String, CloudError> {
        if let Ok(token) = std::env::var("GCP_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }

        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        let url = format!("{}{TOKEN_PATH}", self.metadata_base);
        debug!(url = %url, "Fetching access token from metadata server");

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "metadata server returned {status}: {text}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        let ttl = token.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);

        let mut cached = self.cached.write().await;
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_token_fetch_and_cache() {
        std::env::remove_var("GCP_ACCESS_TOKEN");
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = TokenSource::with_metadata_base(server.uri()).unwrap();
        assert_eq!(source.token().await.unwrap(), "ya29.test-token");
        // second call must come from the cache (expect(1) above)
        assert_eq!(source.token().await.unwrap(), "ya29.test-token");
    }

    #[tokio::test]
    async fn test_token_fetch_unauthorized() {
        std::env::remove_var("GCP_ACCESS_TOKEN");
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source = TokenSource::with_metadata_base(server.uri()).unwrap();
        assert!(matches!(
            source.token().await,
            Err(CloudError::Auth(_))
        ));
    }
}
