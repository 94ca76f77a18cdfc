//! Signed callback scheduling through the durable task queue.
//!
//! A callback carries the full job back to this service after a delay. The
//! body is signed with the originating source's secret, so the callback leg
//! runs through the exact same verification path as the webhook leg.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scaler_cloud::{CallbackTask, CloudError, TaskQueue};
use tracing::info;

use crate::models::Job;
use crate::webhooks::{self, SIGNATURE_HEADER};

/// Builds signed, delayed callback tasks and hands them to the queue.
#[derive(Clone)]
pub struct CallbackScheduler {
    queue: Arc<dyn TaskQueue>,
    /// Delay before the queue dispatches the callback; absorbs the race
    /// between task creation and the webhook's own HTTP response.
    schedule_delay: Duration,
    /// How long the queue waits for the callback handler to respond.
    dispatch_deadline: Duration,
}

impl CallbackScheduler {
    /// Create a scheduler over a queue.
    #[must_use]
    pub fn new(queue: Arc<dyn TaskQueue>, schedule_delay: Duration, dispatch_deadline: Duration) -> Self {
        Self {
            queue,
            schedule_delay,
            dispatch_deadline,
        }
    }

    /// Serialize the job, sign it with the source secret, and submit the
    /// callback task. The queue owns the task afterwards; retry policy is
    /// its responsibility.
    pub async fn schedule(&self, url: &str, secret: &str, job: &Job) -> Result<(), CloudError> {
        let body = serde_json::to_vec(job)?;

        let mut headers = HashMap::new();
        headers.insert(SIGNATURE_HEADER.to_string(), webhooks::sign(secret, &body));

        self.queue
            .create_task(CallbackTask {
                url: url.to_string(),
                headers,
                body,
                schedule_delay: self.schedule_delay,
                dispatch_deadline: self.dispatch_deadline,
            })
            .await?;

        info!(url = %url, job_id = job.id, "Scheduled callback task");
        Ok(())
    }
}
