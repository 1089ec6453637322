//! Asynchronous job dispatch
//!
//! The orchestrator hands follow-up work (such as creating the builds of a
//! retried pipeline) to a queue and never waits for it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const DEFAULT_QUEUE: &str = "default";

/// Kinds of work the orchestrator schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Create the builds of a pipeline; args `{"pipeline_id": <id>}`
    CreateBuilds,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn schedule(
        &self,
        kind: JobKind,
        args: serde_json::Value,
        queue: &str,
    ) -> anyhow::Result<()>;
}

/// A unit of work waiting in a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub args: serde_json::Value,
    pub queue: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Dispatcher backed by an in-process channel
///
/// When `enabled` is false, jobs are logged and dropped; scheduling still
/// reports success.
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    enabled: bool,
    sender: mpsc::UnboundedSender<QueuedJob>,
}

impl QueueDispatcher {
    pub fn new(enabled: bool) -> (Self, mpsc::UnboundedReceiver<QueuedJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { enabled, sender }, receiver)
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn schedule(
        &self,
        kind: JobKind,
        args: serde_json::Value,
        queue: &str,
    ) -> anyhow::Result<()> {
        if !self.enabled {
            tracing::debug!(?kind, %args, queue, "Dispatch disabled, dropping job");
            return Ok(());
        }

        let job = QueuedJob {
            id: Uuid::new_v4(),
            kind,
            args,
            queue: queue.to_string(),
            enqueued_at: Utc::now(),
        };
        let job_id = job.id;

        self.sender
            .send(job)
            .map_err(|_| anyhow::anyhow!("dispatch queue {} is closed", queue))?;

        tracing::debug!(%job_id, ?kind, queue, "Job enqueued");
        Ok(())
    }
}

/// Drain the queue, logging every job
///
/// Build creation happens outside the orchestrator; this consumer only
/// records what was scheduled. Runs until every sender is dropped.
pub async fn drain(mut receiver: mpsc::UnboundedReceiver<QueuedJob>) {
    while let Some(job) = receiver.recv().await {
        tracing::info!(
            job_id = %job.id,
            kind = ?job.kind,
            args = %job.args,
            queue = %job.queue,
            "Job dequeued"
        );
    }
    tracing::info!("Dispatch queue closed");
}
