//! Webhook-driven autoscaler for ephemeral GitHub Actions runners.
//!
//! GitHub `workflow_job` events come in over authenticated webhooks; queued
//! jobs schedule a signed create-VM callback through Cloud Tasks, completed
//! jobs schedule a delete-VM callback. The callbacks re-verify the same
//! per-source HMAC signature and drive the Compute Engine control plane.

pub mod callbacks;
pub mod config;
pub mod github;
pub mod labels;
pub mod models;
pub mod provision;
pub mod server;
pub mod sources;
pub mod webhooks;

pub use config::Config;
