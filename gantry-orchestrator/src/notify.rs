//! Pipeline result notifications
//!
//! Delivery (email, webhooks) lives outside the orchestrator; it only needs
//! to be told once per terminal transition.

use async_trait::async_trait;
use gantry_core::domain::pipeline::Pipeline;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, project_id: i64, pipeline: &Pipeline) -> anyhow::Result<()>;

    async fn notify_failure(&self, project_id: i64, pipeline: &Pipeline) -> anyhow::Result<()>;
}

/// Notifier that records results in the service log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_success(&self, project_id: i64, pipeline: &Pipeline) -> anyhow::Result<()> {
        tracing::info!(
            project_id,
            pipeline_id = pipeline.id,
            sha = %pipeline.sha,
            duration = pipeline.duration,
            "Pipeline succeeded"
        );
        Ok(())
    }

    async fn notify_failure(&self, project_id: i64, pipeline: &Pipeline) -> anyhow::Result<()> {
        tracing::warn!(
            project_id,
            pipeline_id = pipeline.id,
            sha = %pipeline.sha,
            duration = pipeline.duration,
            "Pipeline failed"
        );
        Ok(())
    }
}
