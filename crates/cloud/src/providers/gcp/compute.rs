//! Compute Engine API client implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::auth::TokenSource;
use super::models::{
    GceInstance, GceInstanceResource, GceMetadata, GceMetadataItem, GceOperation,
};
use crate::providers::traits::{
    CloudError, ComputeClient, CreateInstanceRequest, InstanceStatus,
};

/// Base URL for the Compute Engine API.
const API_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How long to wait for a zone operation before giving up. Instance inserts
/// typically finish within tens of seconds.
const OPERATION_TIMEOUT_SECS: u64 = 300;

/// Poll interval for operations that are not yet DONE.
const OPERATION_POLL_SECS: u64 = 2;

/// Compute Engine instance client.
#[derive(Clone)]
pub struct GceComputeClient {
    /// HTTP client.
    client: Client,
    /// API base, overridable for tests.
    api_base: String,
    /// Project ID.
    project_id: String,
    /// Zone the runner instances live in.
    zone: String,
    /// Full resource path of the instance template.
    instance_template: String,
    /// Access-token source.
    tokens: Arc<TokenSource>,
}

impl GceComputeClient {
    /// Create a new Compute Engine client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        project_id: impl Into<String>,
        zone: impl Into<String>,
        instance_template: impl Into<String>,
        tokens: Arc<TokenSource>,
    ) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_base: API_BASE_URL.to_string(),
            project_id: project_id.into(),
            zone: zone.into(),
            instance_template: instance_template.into(),
            tokens,
        })
    }

    /// Point the client at an alternate API endpoint.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn instance_url(&self, name: &str) -> String {
        format!(
            "{}/projects/{}/zones/{}/instances/{}",
            self.api_base, self.project_id, self.zone, name
        )
    }

    async fn bearer(&self) -> Result<String, CloudError> {
        let token = self.tokens.token().await?;
        Ok(format!("Bearer {token}"))
    }

    /// Handle API response.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CloudError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                CloudError::Serialization(e)
            })
        } else if status == StatusCode::NOT_FOUND {
            Err(CloudError::NotFound(text))
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(CloudError::Auth(text))
        } else {
            Err(CloudError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    /// Block until a zone operation is DONE, surfacing operation errors.
    async fn wait_operation(&self, mut op: GceOperation) -> Result<(), CloudError> {
        let start = Instant::now();
        let timeout = Duration::from_secs(OPERATION_TIMEOUT_SECS);

        loop {
            if op.status == "DONE" {
                if let Some(error) = op.error {
                    let message = error
                        .errors
                        .first()
                        .map_or_else(|| "operation failed".to_string(), |e| e.message.clone());
                    return Err(CloudError::Operation(message));
                }
                return Ok(());
            }

            if start.elapsed() > timeout {
                return Err(CloudError::Timeout(OPERATION_TIMEOUT_SECS));
            }

            debug!(
                operation = %op.name,
                status = %op.status,
                elapsed_secs = start.elapsed().as_secs(),
                "Waiting for zone operation"
            );
            tokio::time::sleep(Duration::from_secs(OPERATION_POLL_SECS)).await;

            let url = format!(
                "{}/projects/{}/zones/{}/operations/{}/wait",
                self.api_base, self.project_id, self.zone, op.name
            );
            let response = self
                .client
                .post(&url)
                .header("Authorization", self.bearer().await?)
                .send()
                .await?;
            op = Self::handle_response(response).await?;
        }
    }

    /// Issue a POST that returns a zone operation and block on it.
    async fn post_operation(&self, url: &str) -> Result<(), CloudError> {
        debug!(url = %url, "POST request (operation)");

        let response = self
            .client
            .post(url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;

        let op: GceOperation = Self::handle_response(response).await?;
        self.wait_operation(op).await
    }
}

#[async_trait]
impl ComputeClient for GceComputeClient {
    async fn get_instance(&self, name: &str) -> Result<InstanceStatus, CloudError> {
        let response = self
            .client
            .get(self.instance_url(name))
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;

        let instance: GceInstance = Self::handle_response(response).await?;
        Ok(InstanceStatus::from_gce(&instance.status))
    }

    async fn start_instance(&self, name: &str) -> Result<(), CloudError> {
        info!(instance = %name, "Starting instance");
        let url = format!("{}/start", self.instance_url(name));
        self.post_operation(&url).await?;
        info!(instance = %name, "Started instance");
        Ok(())
    }

    async fn stop_instance(&self, name: &str) -> Result<(), CloudError> {
        info!(instance = %name, "Stopping instance");
        let url = format!("{}/stop", self.instance_url(name));
        self.post_operation(&url).await?;
        info!(instance = %name, "Stopped instance");
        Ok(())
    }

    async fn delete_instance(&self, name: &str) -> Result<(), CloudError> {
        info!(instance = %name, "Deleting instance");

        let response = self
            .client
            .delete(self.instance_url(name))
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            // queue redeliveries of an already-handled delete must drain
            info!(instance = %name, "Instance already gone");
            return Ok(());
        }

        let op: GceOperation = Self::handle_response(response).await?;
        self.wait_operation(op).await?;

        info!(instance = %name, "Deleted instance");
        Ok(())
    }

    async fn insert_from_template(&self, req: CreateInstanceRequest) -> Result<(), CloudError> {
        info!(
            instance = %req.name,
            machine_type = req.machine_type.as_deref().unwrap_or("<template default>"),
            template = %self.instance_template,
            "Creating instance from template"
        );

        let machine_type = req
            .machine_type
            .map(|m| format!("zones/{}/machineTypes/{m}", self.zone));

        let metadata = if req.metadata.is_empty() {
            None
        } else {
            Some(GceMetadata {
                items: req
                    .metadata
                    .into_iter()
                    .map(|entry| GceMetadataItem {
                        key: entry.key,
                        value: entry.value,
                    })
                    .collect(),
            })
        };

        let body = GceInstanceResource {
            name: req.name.clone(),
            machine_type,
            metadata,
        };

        let url = format!(
            "{}/projects/{}/zones/{}/instances",
            self.api_base, self.project_id, self.zone
        );

        let response = self
            .client
            .post(&url)
            .query(&[("sourceInstanceTemplate", self.instance_template.as_str())])
            .header("Authorization", self.bearer().await?)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let op: GceOperation = Self::handle_response(response).await?;
        self.wait_operation(op).await?;

        info!(instance = %req.name, "Created instance from template");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROJECT: &str = "my-gcp-project-id";
    const ZONE: &str = "us-east1-c";
    const TEMPLATE: &str = "projects/my-gcp-project-id/global/instanceTemplates/ephemeral-github-runner";

    fn client(server: &MockServer) -> GceComputeClient {
        GceComputeClient::new(PROJECT, ZONE, TEMPLATE, Arc::new(TokenSource::fixed("tok")))
            .unwrap()
            .with_api_base(server.uri())
    }

    #[tokio::test]
    async fn test_insert_from_template_waits_for_operation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/projects/{PROJECT}/zones/{ZONE}/instances")))
            .and(query_param("sourceInstanceTemplate", TEMPLATE))
            .and(body_partial_json(serde_json::json!({
                "name": "runner-42",
                "machineType": format!("zones/{ZONE}/machineTypes/e2-medium"),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operation-1",
                "status": "RUNNING"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!(
                "/projects/{PROJECT}/zones/{ZONE}/operations/operation-1/wait"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operation-1",
                "status": "DONE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = CreateInstanceRequest {
            name: "runner-42".to_string(),
            machine_type: Some("e2-medium".to_string()),
            metadata: vec![],
        };
        client(&server).insert_from_template(req).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_surfaces_operation_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/projects/{PROJECT}/zones/{ZONE}/instances")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operation-2",
                "status": "DONE",
                "error": {
                    "errors": [{"code": "ZONE_RESOURCE_POOL_EXHAUSTED", "message": "no capacity"}]
                }
            })))
            .mount(&server)
            .await;

        let req = CreateInstanceRequest {
            name: "runner-43".to_string(),
            machine_type: None,
            metadata: vec![],
        };
        let err = client(&server).insert_from_template(req).await.unwrap_err();
        assert!(matches!(err, CloudError::Operation(m) if m == "no capacity"));
    }

    #[tokio::test]
    async fn test_delete_treats_missing_instance_as_success() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!(
                "/projects/{PROJECT}/zones/{ZONE}/instances/runner-1"
            )))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client(&server).delete_instance("runner-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_start_instance_blocks_on_operation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!(
                "/projects/{PROJECT}/zones/{ZONE}/instances/runner-5/start"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operation-3",
                "status": "DONE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).start_instance("runner-5").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_instance_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!(
                "/projects/{PROJECT}/zones/{ZONE}/instances/runner-7"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "runner-7",
                "status": "RUNNING"
            })))
            .mount(&server)
            .await;

        let status = client(&server).get_instance("runner-7").await.unwrap();
        assert_eq!(status, InstanceStatus::Running);
    }
}
