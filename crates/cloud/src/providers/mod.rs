//! Cloud provider implementations.

pub mod gcp;
pub mod traits;

pub use traits::{
    CallbackTask, CloudError, ComputeClient, CreateInstanceRequest, InstanceStatus, MetadataEntry,
    SecretStore, TaskQueue,
};
