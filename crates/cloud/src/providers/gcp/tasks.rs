//! Cloud Tasks API client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use tracing::{debug, info};

use super::auth::TokenSource;
use super::models::{CreateTaskRequest, CreatedTask, HttpRequestDefinition, TaskDefinition};
use crate::providers::traits::{CallbackTask, CloudError, TaskQueue};

/// Base URL for the Cloud Tasks API.
const API_BASE_URL: &str = "https://cloudtasks.googleapis.com/v2";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Cloud Tasks queue client.
#[derive(Clone)]
pub struct CloudTasksClient {
    /// HTTP client.
    client: Client,
    /// API base, overridable for tests.
    api_base: String,
    /// Full queue resource path (`projects/<p>/locations/<l>/queues/<q>`).
    queue: String,
    /// Access-token source.
    tokens: Arc<TokenSource>,
}

impl CloudTasksClient {
    /// Create a new Cloud Tasks client for one queue.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(queue: impl Into<String>, tokens: Arc<TokenSource>) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_base: API_BASE_URL.to_string(),
            queue: queue.into(),
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
impl TaskQueue for CloudTasksClient {
    async fn create_task(&self, task: CallbackTask) -> Result<(), CloudError> {
        let schedule_time = (Utc::now()
            + chrono::Duration::seconds(task.schedule_delay.as_secs().try_into().unwrap_or(0)))
        .to_rfc3339_opts(SecondsFormat::Secs, true);

        let body = CreateTaskRequest {
            task: TaskDefinition {
                schedule_time,
                dispatch_deadline: format!("{}s", task.dispatch_deadline.as_secs()),
                http_request: HttpRequestDefinition {
                    http_method: "POST".to_string(),
                    url: task.url.clone(),
                    headers: task.headers,
                    body: general_purpose::STANDARD.encode(&task.body),
                },
            },
        };

        let url = format!("{}/{}/tasks", self.api_base, self.queue);
        debug!(url = %url, "POST request");

        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CloudError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let created: CreatedTask = response.json().await?;
        info!(task = %created.name, callback_url = %task.url, "Created callback task");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const QUEUE: &str = "projects/my-gcp-project-id/locations/us-east1/queues/scaler-callback-queue";

    fn callback_task() -> CallbackTask {
        let mut headers = HashMap::new();
        headers.insert(
            "x-hub-signature-256".to_string(),
            "sha256=0000000000000000000000000000000000000000000000000000000000000000"
                .to_string(),
        );
        CallbackTask {
            url: "https://scaler.example.com/create_vm?src=repo".to_string(),
            headers,
            body: br#"{"id":42}"#.to_vec(),
            schedule_delay: Duration::from_secs(1),
            dispatch_deadline: Duration::from_secs(120),
        }
    }

    #[tokio::test]
    async fn test_create_task_encodes_body_and_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/{QUEUE}/tasks")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": format!("{QUEUE}/tasks/1234")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudTasksClient::new(QUEUE, Arc::new(TokenSource::fixed("tok")))
            .unwrap()
            .with_api_base(server.uri());
        client.create_task(callback_task()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = requests[0].body_json().unwrap();
        let http_request = &sent["task"]["httpRequest"];

        assert_eq!(http_request["httpMethod"], "POST");
        assert_eq!(
            http_request["url"],
            "https://scaler.example.com/create_vm?src=repo"
        );
        assert!(http_request["headers"]["x-hub-signature-256"]
            .as_str()
            .unwrap()
            .starts_with("sha256="));
        let decoded = general_purpose::STANDARD
            .decode(http_request["body"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, br#"{"id":42}"#);
        assert_eq!(sent["task"]["dispatchDeadline"], "120s");
    }

    #[tokio::test]
    async fn test_create_task_surfaces_queue_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/{QUEUE}/tasks")))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = CloudTasksClient::new(QUEUE, Arc::new(TokenSource::fixed("tok")))
            .unwrap()
            .with_api_base(server.uri());
        let err = client.create_task(callback_task()).await.unwrap_err();
        assert!(matches!(err, CloudError::Api { status: 429, .. }));
    }
}
