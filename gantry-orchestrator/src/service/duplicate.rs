//! Duplication (retry) Service
//!
//! A retry is a fresh pipeline for the same commit. Its builds are created
//! asynchronously by a dispatched job.

use std::sync::Arc;

use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::pipeline::NewPipeline;

use super::{PipelineError, Result};
use crate::dispatch::{Dispatcher, JobKind};
use crate::repository::Store;

/// Length of the abbreviated sha carried by retried pipelines
pub const RETRY_SHA_LEN: usize = 8;

#[derive(Clone)]
pub struct DuplicationService {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    queue: String,
}

impl DuplicationService {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<dyn Dispatcher>, queue: impl Into<String>) -> Self {
        Self {
            store,
            dispatcher,
            queue: queue.into(),
        }
    }

    /// Insert a pending copy of `source` and schedule creation of its builds
    pub async fn duplicate(&self, source: &Pipeline) -> Result<Pipeline> {
        let pipeline = self.store.insert_pipeline(retry_of(source)).await?;

        tracing::info!(
            source_id = source.id,
            pipeline_id = pipeline.id,
            sha = %pipeline.sha,
            "Pipeline retried"
        );

        self.dispatcher
            .schedule(
                JobKind::CreateBuilds,
                serde_json::json!({ "pipeline_id": pipeline.id }),
                &self.queue,
            )
            .await
            .map_err(|err| {
                tracing::warn!(pipeline_id = pipeline.id, "Failed to schedule build creation: {:#}", err);
                PipelineError::external("dispatcher", &pipeline, err)
            })?;

        Ok(pipeline)
    }
}

/// Insert request copying everything but identity, timestamps, status and builds
pub fn retry_of(source: &Pipeline) -> NewPipeline {
    NewPipeline {
        project_id: source.project_id,
        ref_name: source.ref_name.clone(),
        sha: source.sha.chars().take(RETRY_SHA_LEN).collect(),
        before_sha: source.before_sha.clone(),
        tag: source.tag,
        trigger_user_id: source.trigger_user_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::QueueDispatcher;
    use crate::repository::{BuildFilter, MemoryStore};
    use gantry_core::domain::pipeline::PipelineStatus;

    async fn source(store: &MemoryStore, sha: &str) -> Pipeline {
        store
            .insert_pipeline(NewPipeline {
                project_id: 4,
                ref_name: "feature/retry".to_string(),
                sha: sha.to_string(),
                before_sha: Some("0123456789".to_string()),
                tag: true,
                trigger_user_id: Some(11),
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_retry_of_truncates_sha() {
        let now = chrono::Utc::now();
        let pipeline = Pipeline {
            id: 3,
            project_id: 4,
            ref_name: "main".to_string(),
            sha: "a1b2c3d4e5f6".to_string(),
            before_sha: None,
            tag: false,
            trigger_user_id: None,
            status: PipelineStatus::Failed,
            started_at: Some(now),
            finished_at: Some(now),
            duration: Some(0),
            cascade_pending: false,
            created_at: now,
            updated_at: now,
        };

        let new = retry_of(&pipeline);
        assert_eq!(new.sha, "a1b2c3d4");
        assert_eq!(new.project_id, 4);

        let mut short = pipeline.clone();
        short.sha = "abc".to_string();
        assert_eq!(retry_of(&short).sha, "abc");
    }

    #[tokio::test]
    async fn test_duplicate_creates_pending_copy_and_schedules_builds() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, mut queue) = QueueDispatcher::new(true);
        let service = DuplicationService::new(store.clone(), Arc::new(dispatcher), "pipelines");

        let original = source(&store, "a1b2c3d4e5f6").await;
        let retried = service.duplicate(&original).await.unwrap();

        assert_ne!(retried.id, original.id);
        assert_eq!(retried.sha, "a1b2c3d4");
        assert_eq!(retried.status, PipelineStatus::Pending);
        assert_eq!(retried.ref_name, original.ref_name);
        assert_eq!(retried.before_sha, original.before_sha);
        assert_eq!(retried.tag, original.tag);
        assert_eq!(retried.trigger_user_id, original.trigger_user_id);
        assert!(retried.started_at.is_none());
        assert_eq!(
            store.count_builds(retried.id, BuildFilter::All).await.unwrap(),
            0
        );

        let job = queue.recv().await.unwrap();
        assert_eq!(job.kind, JobKind::CreateBuilds);
        assert_eq!(job.args, serde_json::json!({ "pipeline_id": retried.id }));
        assert_eq!(job.queue, "pipelines");
    }

    #[tokio::test]
    async fn test_dispatch_failure_reports_created_pipeline() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, queue) = QueueDispatcher::new(true);
        drop(queue);
        let service = DuplicationService::new(store.clone(), Arc::new(dispatcher), "default");

        let original = source(&store, "a1b2c3d4e5f6").await;
        let err = service.duplicate(&original).await.unwrap_err();

        let created = err.committed_pipeline().cloned().unwrap();
        assert!(matches!(err, PipelineError::ExternalDependency { service: "dispatcher", .. }));
        assert!(store.get_pipeline(created.id).await.unwrap().is_some());
    }
}
