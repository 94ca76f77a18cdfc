//! Google Cloud integrations for the runner scaler.
//!
//! Thin REST clients for the three managed services the scaler depends on:
//!
//! - **Compute Engine** - ephemeral runner instance lifecycle
//! - **Cloud Tasks** - durable, delayed callback delivery
//! - **Secret Manager** - GitHub PAT lookup
//!
//! Each client sits behind an async trait so the service can be exercised
//! against in-memory fakes in tests.

pub mod providers;

pub use providers::{
    gcp, CallbackTask, CloudError, ComputeClient, CreateInstanceRequest, InstanceStatus,
    MetadataEntry, SecretStore, TaskQueue,
};
