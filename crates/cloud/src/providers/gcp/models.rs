//! Google Cloud API request and response models.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Metadata server types
// ============================================================================

/// Access-token response from the metadata server.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The OAuth2 access token.
    pub access_token: String,
    /// Seconds until expiry.
    #[serde(default)]
    pub expires_in: u64,
}

// ============================================================================
// Compute Engine types
// ============================================================================

/// Instance resource for insert-from-template requests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GceInstanceResource {
    /// Instance name.
    pub name: String,
    /// Machine type URL (`zones/<zone>/machineTypes/<type>`); template
    /// default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    /// Metadata merged over the template's metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GceMetadata>,
}

/// Instance metadata.
#[derive(Debug, Serialize)]
pub struct GceMetadata {
    /// Metadata entries.
    pub items: Vec<GceMetadataItem>,
}

/// One metadata entry.
#[derive(Debug, Serialize)]
pub struct GceMetadataItem {
    /// Metadata key.
    pub key: String,
    /// Metadata value.
    pub value: String,
}

/// Instance information (the fields the scaler reads).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceInstance {
    /// Instance name.
    pub name: String,
    /// Lifecycle status string (PROVISIONING, RUNNING, TERMINATED, ...).
    #[serde(default)]
    pub status: String,
}

/// A zone operation returned by mutating instance calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceOperation {
    /// Operation name, used for polling.
    pub name: String,
    /// PENDING, RUNNING or DONE.
    #[serde(default)]
    pub status: String,
    /// Populated when the operation finished with errors.
    #[serde(default)]
    pub error: Option<GceOperationError>,
}

/// Error block of a finished operation.
#[derive(Debug, Clone, Deserialize)]
pub struct GceOperationError {
    /// Individual error entries.
    #[serde(default)]
    pub errors: Vec<GceOperationErrorDetail>,
}

/// One operation error entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GceOperationErrorDetail {
    /// Error code (e.g. `ZONE_RESOURCE_POOL_EXHAUSTED`).
    #[serde(default)]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// Cloud Tasks types
// ============================================================================

/// Create-task request.
#[derive(Debug, Serialize)]
pub struct CreateTaskRequest {
    /// The task to enqueue.
    pub task: TaskDefinition,
}

/// Task definition.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    /// RFC 3339 time at which the queue dispatches the task.
    pub schedule_time: String,
    /// Handler response deadline, duration format (`"120s"`).
    pub dispatch_deadline: String,
    /// The HTTP request the queue performs.
    pub http_request: HttpRequestDefinition,
}

/// HTTP request carried by a task.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestDefinition {
    /// HTTP method name.
    pub http_method: String,
    /// Target URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Base64-encoded request body.
    pub body: String,
}

/// Created-task response (the fields the scaler reads).
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedTask {
    /// Fully qualified task name.
    #[serde(default)]
    pub name: String,
}

// ============================================================================
// Secret Manager types
// ============================================================================

/// Access-secret-version response.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessSecretVersionResponse {
    /// Secret payload.
    pub payload: SecretPayload,
}

/// Secret payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretPayload {
    /// Base64-encoded secret data.
    #[serde(default)]
    pub data: String,
}
