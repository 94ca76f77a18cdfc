//! Ephemeral runner VM provisioning.
//!
//! One queued job maps to one instance: the jit config is issued first, then
//! injected as instance metadata together with a startup-script wrapper that
//! hands it to the registration script baked into the project metadata.

use std::sync::Arc;

use scaler_cloud::{CloudError, ComputeClient, CreateInstanceRequest, MetadataEntry, SecretStore};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::github::{GitHubClient, GitHubError};
use crate::labels::MACHINE_DIRECTIVE;
use crate::models::Job;
use crate::sources::Source;

/// Metadata attribute prefix carrying the jit config.
const JIT_CONFIG_ATTR: &str = "jit_config";

/// Project-level metadata key of the registration script.
/// Has to match the global custom metadata in compute.tf.
const REGISTER_JIT_RUNNER_SCRIPT_ATTR: &str = "startup_script_register_jit_runner";

/// Errors while provisioning or deprovisioning a runner VM.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The PAT could not be read from the secret store. The underlying
    /// secret-store error is logged, never surfaced.
    #[error("missing GitHub PAT")]
    MissingPat,

    /// The stored PAT is empty.
    #[error("empty GitHub PAT")]
    EmptyPat,

    /// The jit-config exchange failed.
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// The instance control plane failed.
    #[error(transparent)]
    Cloud(#[from] CloudError),
}

/// Transient per-callback settings of the instance about to be created.
#[derive(Debug, Clone)]
pub struct VmSettings {
    /// Instance name.
    pub name: String,
    /// Machine-type override from the `@machine:` directive.
    pub machine_type: Option<String>,
}

/// Creates and deletes runner instances.
pub struct RunnerProvisioner {
    github: GitHubClient,
    compute: Arc<dyn ComputeClient>,
    secrets: Arc<dyn SecretStore>,
    /// Secret-version path of the GitHub PAT.
    secret_version: String,
    /// Prefix for generated instance names.
    runner_prefix: String,
    /// Dry-run mode: log instead of touching the control plane.
    simulate: bool,
}

impl RunnerProvisioner {
    /// Create a provisioner.
    #[must_use]
    pub fn new(
        github: GitHubClient,
        compute: Arc<dyn ComputeClient>,
        secrets: Arc<dyn SecretStore>,
        secret_version: impl Into<String>,
        runner_prefix: impl Into<String>,
        simulate: bool,
    ) -> Self {
        Self {
            github,
            compute,
            secrets,
            secret_version: secret_version.into(),
            runner_prefix: runner_prefix.into(),
            simulate,
        }
    }

    /// The instance name for a job. Deterministic, so a redelivered create
    /// callback re-inserts the same name instead of leaking a second VM.
    #[must_use]
    pub fn instance_name(&self, job: &Job) -> String {
        format!("{}-{}", self.runner_prefix, job.id)
    }

    async fn read_pat(&self) -> Result<String, ProvisionError> {
        let data = self
            .secrets
            .access_secret_version(&self.secret_version)
            .await
            .map_err(|e| {
                error!(secret_version = %self.secret_version, error = %e, "Could not access GitHub PAT secret version");
                ProvisionError::MissingPat
            })?;
        let pat = String::from_utf8(data).map_err(|_| {
            error!("The GitHub PAT secret is not valid UTF-8");
            ProvisionError::MissingPat
        })?;
        if pat.is_empty() {
            error!("The GitHub PAT secret is empty");
            return Err(ProvisionError::EmptyPat);
        }
        Ok(pat)
    }

    /// Issue a jit config for the job's runner and create the instance with
    /// the config injected as metadata. Returns the instance name.
    ///
    /// Blocks until the instance insert completes. A jit config issued before
    /// a failed insert is simply discarded; the single-use token expires on
    /// the GitHub side.
    pub async fn create_vm(
        &self,
        source: &Source,
        runner_group_id: i64,
        job: &Job,
    ) -> Result<String, ProvisionError> {
        let settings = VmSettings {
            name: self.instance_name(job),
            machine_type: job.directive_value(MACHINE_DIRECTIVE).map(String::from),
        };

        if self.simulate {
            warn!(
                instance = %settings.name,
                source = %source.name,
                "Simulation mode - skipping jit-config exchange and instance creation"
            );
            return Ok(settings.name);
        }

        let pat = self.read_pat().await?;
        let endpoint = self.github.jit_config_endpoint(source);
        let jit_config = self
            .github
            .generate_jit_config(&endpoint, &pat, &settings.name, runner_group_id, &job.labels)
            .await?;

        // Randomized attribute key so concurrently-starting instances on the
        // same template cannot clobber each other's config.
        let config_attr = format!("{JIT_CONFIG_ATTR}_{}", Uuid::new_v4().simple());
        let startup_script = startup_script_wrapper(&config_attr);

        self.compute
            .insert_from_template(CreateInstanceRequest {
                name: settings.name.clone(),
                machine_type: settings.machine_type.clone(),
                metadata: vec![
                    MetadataEntry {
                        key: config_attr,
                        value: jit_config,
                    },
                    MetadataEntry {
                        key: "startup-script".to_string(),
                        value: startup_script,
                    },
                ],
            })
            .await?;

        info!(instance = %settings.name, source = %source.name, "Created runner instance");
        Ok(settings.name)
    }

    /// Delete the instance backing a finished runner. Blocks until the
    /// deletion completes; a missing instance counts as deleted.
    pub async fn delete_vm(&self, runner_name: &str) -> Result<(), ProvisionError> {
        if self.simulate {
            warn!(instance = %runner_name, "Simulation mode - skipping instance deletion");
            return Ok(());
        }

        self.compute.delete_instance(runner_name).await?;
        info!(instance = %runner_name, "Deleted runner instance");
        Ok(())
    }
}

/// Startup script injected as instance metadata: fetches the jit config and
/// the registration script from the metadata service, runs the script with
/// the config, and removes itself.
fn startup_script_wrapper(config_attr: &str) -> String {
    format!(
        r#"#!/bin/bash
val=$(curl "http://metadata.google.internal/computeMetadata/v1/instance/attributes/{config_attr}" -H "Metadata-Flavor: Google")
curl "http://metadata.google.internal/computeMetadata/v1/project/attributes/{REGISTER_JIT_RUNNER_SCRIPT_ATTR}" -H "Metadata-Flavor: Google" > runner_startup.sh
chmod +x ./runner_startup.sh
./runner_startup.sh $val
rm runner_startup.sh
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType;

    #[test]
    fn test_instance_name_is_deterministic() {
        let provisioner = test_provisioner();
        let job = Job {
            id: 29_679_449,
            ..Job::default()
        };
        assert_eq!(provisioner.instance_name(&job), "runner-29679449");
        assert_eq!(provisioner.instance_name(&job), "runner-29679449");
    }

    #[test]
    fn test_startup_script_wrapper_references_config_attr() {
        let script = startup_script_wrapper("jit_config_abc123");
        assert!(script.contains("instance/attributes/jit_config_abc123"));
        assert!(script.contains(REGISTER_JIT_RUNNER_SCRIPT_ATTR));
        assert!(script.contains("rm runner_startup.sh"));
    }

    #[tokio::test]
    async fn test_simulate_skips_control_plane() {
        let provisioner = test_provisioner();
        let source = Source {
            name: "acme/widgets".to_string(),
            source_type: SourceType::Repository,
            secret: String::new(),
        };
        let job = Job {
            id: 1,
            ..Job::default()
        };
        // the panicking fakes prove nothing downstream is called
        let name = provisioner.create_vm(&source, 1, &job).await.unwrap();
        assert_eq!(name, "runner-1");
        provisioner.delete_vm("runner-1").await.unwrap();
    }

    fn test_provisioner() -> RunnerProvisioner {
        use async_trait::async_trait;
        use scaler_cloud::InstanceStatus;

        struct PanickingCompute;

        #[async_trait]
        impl ComputeClient for PanickingCompute {
            async fn get_instance(&self, _: &str) -> Result<InstanceStatus, CloudError> {
                panic!("compute must not be called")
            }
            async fn start_instance(&self, _: &str) -> Result<(), CloudError> {
                panic!("compute must not be called")
            }
            async fn stop_instance(&self, _: &str) -> Result<(), CloudError> {
                panic!("compute must not be called")
            }
            async fn delete_instance(&self, _: &str) -> Result<(), CloudError> {
                panic!("compute must not be called")
            }
            async fn insert_from_template(
                &self,
                _: CreateInstanceRequest,
            ) -> Result<(), CloudError> {
                panic!("compute must not be called")
            }
        }

        struct PanickingSecrets;

        #[async_trait]
        impl SecretStore for PanickingSecrets {
            async fn access_secret_version(&self, _: &str) -> Result<Vec<u8>, CloudError> {
                panic!("secret store must not be called")
            }
        }

        RunnerProvisioner::new(
            GitHubClient::new().unwrap(),
            Arc::new(PanickingCompute),
            Arc::new(PanickingSecrets),
            "projects/p/secrets/github-pat-token/versions/latest",
            "runner",
            true,
        )
    }
}
