//! Google Cloud REST clients.

pub mod auth;
pub mod compute;
pub mod models;
pub mod secrets;
pub mod tasks;

pub use auth::TokenSource;
pub use compute::GceComputeClient;
pub use secrets::SecretManagerClient;
pub use tasks::CloudTasksClient;
