//! Runner scaler service binary.
//!
//! Webhook-driven autoscaler for ephemeral GitHub Actions runners on
//! Compute Engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scaler::callbacks::CallbackScheduler;
use scaler::config::Config;
use scaler::github::GitHubClient;
use scaler::provision::RunnerProvisioner;
use scaler::server::{self, AppState};
use scaler_cloud::gcp::{CloudTasksClient, GceComputeClient, SecretManagerClient, TokenSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("scaler=info".parse()?))
        .init();

    info!("Starting runner scaler...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    if config.sources.is_empty() {
        warn!("No webhook sources registered - every webhook will be ignored");
    }
    if config.simulate {
        warn!("Simulation mode is active - no VMs will be created or deleted");
    }

    // Cloud control-plane clients, sharing one token source
    let tokens = Arc::new(TokenSource::new().context("Failed to create token source")?);
    let compute = Arc::new(
        GceComputeClient::new(
            config.project_id.clone(),
            config.zone.clone(),
            config.instance_template.clone(),
            tokens.clone(),
        )
        .context("Failed to create Compute Engine client")?,
    );
    let queue = Arc::new(
        CloudTasksClient::new(config.task_queue.clone(), tokens.clone())
            .context("Failed to create Cloud Tasks client")?,
    );
    let secrets = Arc::new(
        SecretManagerClient::new(tokens).context("Failed to create Secret Manager client")?,
    );

    let github = GitHubClient::new()
        .context("Failed to create GitHub client")?
        .with_api_base(config.github_api_base.clone());

    let scheduler = CallbackScheduler::new(
        queue,
        Duration::from_secs(config.callback_delay_secs),
        Duration::from_secs(config.task_dispatch_timeout_secs),
    );
    let provisioner = RunnerProvisioner::new(
        github,
        compute,
        secrets,
        config.secret_version.clone(),
        config.runner_prefix.clone(),
        config.simulate,
    );

    let port = config.port;
    let labels = config.runner_labels.join(", ");

    // Build application state and router
    let state = AppState {
        config: Arc::new(config),
        scheduler: Arc::new(scheduler),
        provisioner: Arc::new(provisioner),
    };
    let app = server::build_router(state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(
        port,
        labels = %labels,
        "Runner scaler listening, observing workflow jobs"
    );

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
