//! GitHub webhook wire models.

use serde::{Deserialize, Serialize};

use crate::labels;

/// A workflow job as carried by `workflow_job` webhooks and callback bodies.
///
/// Fields GitHub sends as `null` on queued jobs (runner assignment happens
/// later) are optional here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    /// Job id, unique per source.
    #[serde(default)]
    pub id: i64,
    /// Job name.
    #[serde(default)]
    pub name: String,
    /// Lifecycle status string.
    #[serde(default)]
    pub status: String,
    /// Requested labels, in workflow order.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Name of the runner that picked the job up.
    #[serde(default)]
    pub runner_name: Option<String>,
    /// Runner group name.
    #[serde(default)]
    pub runner_group_name: Option<String>,
    /// Runner group id.
    #[serde(default)]
    pub runner_group_id: Option<i64>,
}

impl Job {
    /// Check the configured runner labels against this job's labels.
    /// Directives are exempt; see [`labels::has_all_labels`].
    #[must_use]
    pub fn has_all_labels(&self, required: &[String]) -> (bool, Vec<String>) {
        labels::has_all_labels(&self.labels, required)
    }

    /// Value of the first `@<key>:<value>` directive label, if any.
    #[must_use]
    pub fn directive_value(&self, key: &str) -> Option<&str> {
        labels::directive_value(&self.labels, key)
    }
}

/// The lifecycle action that triggered a `workflow_job` webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Job is waiting for a runner.
    Queued,
    /// Job finished (any conclusion).
    Completed,
    /// Job is running.
    InProgress,
    /// Job is waiting for deployment approval.
    Waiting,
    /// Unknown action (catch-all to avoid parse failures)
    #[serde(other)]
    Other,
}

/// A `workflow_job` webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    /// Triggering lifecycle action.
    pub action: Action,
    /// The job itself.
    pub workflow_job: Job,
}
