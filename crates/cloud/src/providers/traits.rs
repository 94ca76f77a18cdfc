//! Collaborator traits and common types.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during cloud service operations.
#[derive(Error, Debug)]
pub enum CloudError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A long-running operation completed with an error.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Payload decoding error.
    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Instance (VM) lifecycle state as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Resources are being allocated; the VM is not running yet.
    Provisioning,
    /// Resources acquired; the VM is preparing for first boot.
    Staging,
    /// The VM is booting or running.
    Running,
    /// The VM is being stopped.
    Stopping,
    /// The VM is being suspended.
    Suspending,
    /// The VM is suspended.
    Suspended,
    /// The VM is stopped.
    Terminated,
    /// The VM is under automatic repair.
    Repairing,
    /// Unknown status.
    Unknown,
}

impl InstanceStatus {
    /// Map a Compute Engine status string to a typed state.
    #[must_use]
    pub fn from_gce(status: &str) -> Self {
        match status {
            "PROVISIONING" => Self::Provisioning,
            "STAGING" => Self::Staging,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "SUSPENDING" => Self::Suspending,
            "SUSPENDED" => Self::Suspended,
            "TERMINATED" => Self::Terminated,
            "REPAIRING" => Self::Repairing,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Staging => write!(f, "staging"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Suspending => write!(f, "suspending"),
            Self::Suspended => write!(f, "suspended"),
            Self::Terminated => write!(f, "terminated"),
            Self::Repairing => write!(f, "repairing"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One instance-metadata entry attached at creation time.
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    /// Metadata key.
    pub key: String,
    /// Metadata value.
    pub value: String,
}

/// Request to create an instance from the configured template.
#[derive(Debug, Clone)]
pub struct CreateInstanceRequest {
    /// Instance name.
    pub name: String,
    /// Machine type override (short name, e.g. "e2-medium"); template default
    /// when absent.
    pub machine_type: Option<String>,
    /// Metadata entries merged over the template's metadata.
    pub metadata: Vec<MetadataEntry>,
}

/// A delayed, signed HTTP callback handed to the durable queue.
#[derive(Debug, Clone)]
pub struct CallbackTask {
    /// Target URL (POST).
    pub url: String,
    /// Headers attached to the dispatched request.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Vec<u8>,
    /// Delay before the queue dispatches the callback.
    pub schedule_delay: Duration,
    /// How long the queue waits for the handler to respond before it counts
    /// the dispatch as failed and applies its own retry policy.
    pub dispatch_deadline: Duration,
}

/// Compute-instance control plane.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Fetch the current lifecycle state of an instance.
    async fn get_instance(&self, name: &str) -> Result<InstanceStatus, CloudError>;

    /// Start a stopped instance. Blocks until the operation completes.
    async fn start_instance(&self, name: &str) -> Result<(), CloudError>;

    /// Stop a running instance. Blocks until the operation completes.
    async fn stop_instance(&self, name: &str) -> Result<(), CloudError>;

    /// Delete an instance. Blocks until the operation completes. Deleting an
    /// instance that no longer exists is a success.
    async fn delete_instance(&self, name: &str) -> Result<(), CloudError>;

    /// Create an instance from the configured template. Blocks until the
    /// operation completes.
    async fn insert_from_template(&self, req: CreateInstanceRequest) -> Result<(), CloudError>;
}

/// Durable task queue with at-least-once delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submit a callback task. Ownership passes to the queue on success.
    async fn create_task(&self, task: CallbackTask) -> Result<(), CloudError>;
}

/// Versioned secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the payload of a secret version by its full resource name.
    async fn access_secret_version(&self, name: &str) -> Result<Vec<u8>, CloudError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_status_from_gce() {
        assert_eq!(InstanceStatus::from_gce("RUNNING"), InstanceStatus::Running);
        assert_eq!(
            InstanceStatus::from_gce("PROVISIONING"),
            InstanceStatus::Provisioning
        );
        assert_eq!(
            InstanceStatus::from_gce("TERMINATED"),
            InstanceStatus::Terminated
        );
        assert_eq!(InstanceStatus::from_gce("whatever"), InstanceStatus::Unknown);
    }
}
