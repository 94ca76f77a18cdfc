//! Configuration for the scaler service.
//!
//! Everything comes from the environment, loaded once at startup. Webhook
//! sources are registered from `GITHUB_ENTERPRISE`, `GITHUB_ORG` and
//! `GITHUB_REPOS`, each entry of the form `<name>;<base64 secret>`.

use std::env;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use tracing::warn;

use crate::sources::{Source, SourceRegistry, SourceType};

/// Default GitHub REST API base.
const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

/// Scaler service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Webhook route.
    pub route_webhook: String,
    /// Create-VM callback route.
    pub route_create_vm: String,
    /// Delete-VM callback route.
    pub route_delete_vm: String,
    /// HTTP server port.
    pub port: u16,
    /// Query parameter carrying the source registry key.
    pub source_query_param: String,
    /// GCP project id.
    pub project_id: String,
    /// Zone the runner instances live in.
    pub zone: String,
    /// Full Cloud Tasks queue path.
    pub task_queue: String,
    /// Full instance-template resource path.
    pub instance_template: String,
    /// Full secret-version path of the GitHub PAT.
    pub secret_version: String,
    /// Prefix for generated runner instance names.
    pub runner_prefix: String,
    /// Runner group new runners register into.
    pub runner_group_id: i64,
    /// Labels a job must request for this service to act on it.
    pub runner_labels: Vec<String>,
    /// Delay before the queue dispatches a callback, in seconds.
    pub callback_delay_secs: u64,
    /// Callback handler response deadline, in seconds.
    pub task_dispatch_timeout_secs: u64,
    /// GitHub REST API base (overridable for tests).
    pub github_api_base: String,
    /// When set, instance create/delete are logged but not executed.
    pub simulate: bool,
    /// Registered webhook sources.
    pub sources: SourceRegistry,
}

impl Config {
    /// Load the configuration from the environment.
    ///
    /// # Errors
    /// Returns an error when a required variable is missing or a configured
    /// webhook secret is not valid base64.
    pub fn from_env() -> Result<Self> {
        let mut sources = SourceRegistry::new();

        if let Some((name, secret)) = split_source_entry(&env_or("GITHUB_ENTERPRISE", "")) {
            sources.register(
                name.clone(),
                Source {
                    name,
                    source_type: SourceType::Enterprise,
                    secret: decode_secret(&secret)
                        .context("GITHUB_ENTERPRISE secret is not valid base64")?,
                },
            );
        }

        if let Some((name, secret)) = split_source_entry(&env_or("GITHUB_ORG", "")) {
            sources.register(
                name.clone(),
                Source {
                    name,
                    source_type: SourceType::Organization,
                    secret: decode_secret(&secret)
                        .context("GITHUB_ORG secret is not valid base64")?,
                },
            );
        }

        for entry in env_or("GITHUB_REPOS", "").split(',') {
            if let Some((name, secret)) = split_source_entry(entry) {
                let secret = decode_secret(&secret)
                    .with_context(|| format!("GITHUB_REPOS secret for {name} is not valid base64"))?;
                sources.register(
                    name.clone(),
                    Source {
                        name,
                        source_type: SourceType::Repository,
                        secret,
                    },
                );
            }
        }

        let runner_labels: Vec<String> = env_or("RUNNER_LABELS", "self-hosted")
            .split(',')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if runner_labels.is_empty() {
            warn!("No workflow runner labels were provided. You should at least add the label \"self-hosted\"");
        }

        Ok(Self {
            route_webhook: env_or("ROUTE_WEBHOOK", "/webhook"),
            route_create_vm: env_or("ROUTE_CREATE_VM", "/create_vm"),
            route_delete_vm: env_or("ROUTE_DELETE_VM", "/delete_vm"),
            port: env_parse_or("PORT", 8080),
            source_query_param: env_or("SOURCE_QUERY_PARAM_NAME", "src"),
            project_id: env_required("PROJECT_ID")?,
            zone: env_required("ZONE")?,
            task_queue: env_required("TASK_QUEUE")?,
            instance_template: env_required("INSTANCE_TEMPLATE")?,
            secret_version: env_required("SECRET_VERSION")?,
            runner_prefix: env_or("RUNNER_PREFIX", "runner"),
            runner_group_id: env_parse_or("RUNNER_GROUP_ID", 1),
            runner_labels,
            callback_delay_secs: env_parse_or("CREATE_VM_DELAY", 1),
            task_dispatch_timeout_secs: env_parse_or("TASK_DISPATCH_TIMEOUT", 120),
            github_api_base: env_or("GITHUB_API_BASE", DEFAULT_GITHUB_API_BASE),
            simulate: env::var("SIMULATE").map(|v| v == "true" || v == "1").unwrap_or(false),
            sources,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("Mandatory env {name} not found"))
}

/// Split a `<name>;<base64 secret>` source entry.
fn split_source_entry(entry: &str) -> Option<(String, String)> {
    let (name, secret) = entry.split_once(';')?;
    if name.is_empty() || secret.is_empty() {
        return None;
    }
    Some((name.to_string(), secret.to_string()))
}

/// Decode a base64-encoded webhook secret to its UTF-8 form.
fn decode_secret(encoded: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD.decode(encoded)?;
    String::from_utf8(bytes).context("decoded secret is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Use a mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const REQUIRED: &[(&str, &str)] = &[
        ("PROJECT_ID", "my-gcp-project-id"),
        ("ZONE", "us-east1-c"),
        (
            "TASK_QUEUE",
            "projects/my-gcp-project-id/locations/us-east1/queues/scaler-callback-queue",
        ),
        (
            "INSTANCE_TEMPLATE",
            "projects/my-gcp-project-id/global/instanceTemplates/ephemeral-github-runner",
        ),
        (
            "SECRET_VERSION",
            "projects/my-gcp-project-id/secrets/github-pat-token/versions/latest",
        ),
    ];

    const OPTIONAL: &[&str] = &[
        "ROUTE_WEBHOOK",
        "ROUTE_CREATE_VM",
        "ROUTE_DELETE_VM",
        "PORT",
        "SOURCE_QUERY_PARAM_NAME",
        "RUNNER_PREFIX",
        "RUNNER_GROUP_ID",
        "RUNNER_LABELS",
        "CREATE_VM_DELAY",
        "TASK_DISPATCH_TIMEOUT",
        "GITHUB_API_BASE",
        "SIMULATE",
        "GITHUB_ENTERPRISE",
        "GITHUB_ORG",
        "GITHUB_REPOS",
    ];

    fn set_required() {
        for (name, value) in REQUIRED {
            env::set_var(name, value);
        }
    }

    fn clear_all() {
        for (name, _) in REQUIRED {
            env::remove_var(name);
        }
        for name in OPTIONAL {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_all();
        set_required();

        let config = Config::from_env().unwrap();
        assert_eq!(config.route_webhook, "/webhook");
        assert_eq!(config.route_create_vm, "/create_vm");
        assert_eq!(config.route_delete_vm, "/delete_vm");
        assert_eq!(config.port, 8080);
        assert_eq!(config.source_query_param, "src");
        assert_eq!(config.runner_prefix, "runner");
        assert_eq!(config.runner_group_id, 1);
        assert_eq!(config.runner_labels, vec!["self-hosted".to_string()]);
        assert_eq!(config.callback_delay_secs, 1);
        assert_eq!(config.task_dispatch_timeout_secs, 120);
        assert_eq!(config.github_api_base, "https://api.github.com");
        assert!(!config.simulate);
        assert!(config.sources.is_empty());

        clear_all();
    }

    #[test]
    fn test_missing_required_var_fails() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_all();
        set_required();
        env::remove_var("PROJECT_ID");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("PROJECT_ID"));

        clear_all();
    }

    #[test]
    fn test_source_registration_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_all();
        set_required();

        let secret = general_purpose::STANDARD.encode("It's a Secret to Everybody");
        env::set_var("GITHUB_ORG", format!("acme;{secret}"));
        env::set_var(
            "GITHUB_REPOS",
            format!("acme/widgets;{secret},acme/gadgets;{secret}"),
        );

        let config = Config::from_env().unwrap();
        assert_eq!(config.sources.len(), 3);

        let org = config.sources.get("acme").unwrap();
        assert_eq!(org.source_type, SourceType::Organization);
        assert_eq!(org.secret, "It's a Secret to Everybody");

        let repo = config.sources.get("acme/widgets").unwrap();
        assert_eq!(repo.source_type, SourceType::Repository);

        clear_all();
    }

    #[test]
    fn test_invalid_secret_base64_fails() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_all();
        set_required();
        env::set_var("GITHUB_ORG", "acme;not base64!!!");

        assert!(Config::from_env().is_err());

        clear_all();
    }

    #[test]
    fn test_runner_labels_parsing() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_all();
        set_required();
        env::set_var("RUNNER_LABELS", "self-hosted, linux ,x64");

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.runner_labels,
            vec![
                "self-hosted".to_string(),
                "linux".to_string(),
                "x64".to_string()
            ]
        );

        clear_all();
    }
}
