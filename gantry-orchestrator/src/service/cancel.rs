//! Cancellation Coordinator
//!
//! Cancelling is a two-step saga. The pipeline is first marked `cancelled`
//! together with `cascade_pending`; the flag is cleared only once every
//! active build has been cancelled. A pipeline left with the flag set is
//! picked up again by [`CancellationCoordinator::retry_cascade`].

use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::domain::build::{Build, BuildStatus};
use gantry_core::domain::pipeline::{Pipeline, PipelineStatus};
use gantry_core::dto::pipeline::PipelineChanges;

use super::transition::{Transition, finish_times, started_if_pending};
use super::{BuildCancelFailure, PipelineError, Result};
use crate::clock::Clock;
use crate::repository::{BuildFilter, Store, StoreError};

/// Stops a single running or pending build
#[async_trait]
pub trait BuildCanceller: Send + Sync {
    async fn cancel_build(&self, build: &Build) -> anyhow::Result<()>;
}

/// Canceller that only records the cancellation in the store
#[derive(Clone)]
pub struct StoreBuildCanceller {
    store: Arc<dyn Store>,
}

impl StoreBuildCanceller {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuildCanceller for StoreBuildCanceller {
    async fn cancel_build(&self, build: &Build) -> anyhow::Result<()> {
        self.store
            .update_build_status(build.id, BuildStatus::Cancelled)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct CancellationCoordinator {
    store: Arc<dyn Store>,
    canceller: Arc<dyn BuildCanceller>,
    clock: Arc<dyn Clock>,
}

impl CancellationCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        canceller: Arc<dyn BuildCanceller>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            canceller,
            clock,
        }
    }

    /// Cancel `pipeline` and every build still active in it
    ///
    /// Terminal pipelines are left alone, except that a cancelled pipeline
    /// with an unfinished cascade gets its cascade retried.
    pub async fn cancel(&self, pipeline: &Pipeline) -> Result<Transition> {
        if pipeline.is_terminal() {
            return self.retry_cascade(pipeline).await;
        }

        let (finished_at, duration) = finish_times(pipeline, self.clock.now());
        let changes = started_if_pending(
            pipeline,
            PipelineChanges::expecting(pipeline.status)
                .status(PipelineStatus::Cancelled)
                .finished(finished_at, duration)
                .cascade_pending(true),
        );

        let cancelled = match self.store.update_pipeline(pipeline.id, changes).await {
            Ok(cancelled) => cancelled,
            Err(StoreError::Conflict { actual, .. }) => {
                tracing::warn!(
                    pipeline_id = pipeline.id,
                    actual = %actual,
                    "Pipeline changed while cancelling, re-evaluating"
                );
                let current = self.store.get_pipeline(pipeline.id).await?.ok_or(
                    PipelineError::NotFound {
                        entity: "pipeline",
                        id: pipeline.id,
                    },
                )?;
                return Box::pin(self.cancel(&current)).await;
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!(pipeline_id = cancelled.id, "Pipeline cancelled");

        self.cascade(cancelled).await.map(Transition::Applied)
    }

    /// Re-run the build cascade of a cancelled pipeline
    pub async fn retry_cascade(&self, pipeline: &Pipeline) -> Result<Transition> {
        if pipeline.status != PipelineStatus::Cancelled || !pipeline.cascade_pending {
            tracing::debug!(
                pipeline_id = pipeline.id,
                status = %pipeline.status,
                "Pipeline already finished, nothing to cancel"
            );
            return Ok(Transition::Unchanged(pipeline.clone()));
        }

        tracing::info!(pipeline_id = pipeline.id, "Retrying cancellation cascade");
        self.cascade(pipeline.clone()).await.map(Transition::Applied)
    }

    async fn cascade(&self, pipeline: Pipeline) -> Result<Pipeline> {
        let builds = self
            .store
            .list_builds(pipeline.id, BuildFilter::Active)
            .await?;

        let mut failed_builds = Vec::new();
        for build in &builds {
            if let Err(err) = self.canceller.cancel_build(build).await {
                tracing::warn!(
                    pipeline_id = pipeline.id,
                    build_id = build.id,
                    "Failed to cancel build: {:#}",
                    err
                );
                failed_builds.push(BuildCancelFailure {
                    build_id: build.id,
                    reason: format!("{:#}", err),
                });
            }
        }

        if !failed_builds.is_empty() {
            return Err(PipelineError::PartialCascadeFailure {
                pipeline: Box::new(pipeline),
                failed_builds,
            });
        }

        let done = self
            .store
            .update_pipeline(pipeline.id, PipelineChanges::default().cascade_pending(false))
            .await?;

        tracing::debug!(
            pipeline_id = done.id,
            builds = builds.len(),
            "Cancellation cascade complete"
        );
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::repository::MemoryStore;
    use gantry_core::dto::build::NewBuild;
    use gantry_core::dto::pipeline::NewPipeline;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Cancels through the store unless the build is marked as stuck
    struct FlakyCanceller {
        inner: StoreBuildCanceller,
        stuck: Mutex<HashSet<i64>>,
    }

    #[async_trait]
    impl BuildCanceller for FlakyCanceller {
        async fn cancel_build(&self, build: &Build) -> anyhow::Result<()> {
            if self.stuck.lock().unwrap().contains(&build.id) {
                anyhow::bail!("runner for build {} unreachable", build.id);
            }
            self.inner.cancel_build(build).await
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        canceller: Arc<FlakyCanceller>,
        coordinator: CancellationCoordinator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let canceller = Arc::new(FlakyCanceller {
            inner: StoreBuildCanceller::new(store.clone()),
            stuck: Mutex::new(HashSet::new()),
        });
        let coordinator =
            CancellationCoordinator::new(store.clone(), canceller.clone(), Arc::new(SystemClock));
        Fixture {
            store,
            canceller,
            coordinator,
        }
    }

    async fn pipeline_with_builds(store: &MemoryStore, statuses: &[BuildStatus]) -> (Pipeline, Vec<Build>) {
        let pipeline = store
            .insert_pipeline(NewPipeline {
                project_id: 1,
                ref_name: "main".to_string(),
                sha: "cafebabe".to_string(),
                before_sha: None,
                tag: false,
                trigger_user_id: None,
            })
            .await
            .unwrap();

        let mut builds = Vec::new();
        for (i, status) in statuses.iter().enumerate() {
            let build = store
                .insert_build(NewBuild {
                    pipeline_id: pipeline.id,
                    name: format!("job-{i}"),
                    stage: None,
                    allow_failure: false,
                })
                .await
                .unwrap();
            builds.push(store.update_build_status(build.id, *status).await.unwrap());
        }

        let running = store
            .update_pipeline(
                pipeline.id,
                PipelineChanges::default()
                    .status(PipelineStatus::Running)
                    .started_at(chrono::Utc::now()),
            )
            .await
            .unwrap();
        (running, builds)
    }

    #[tokio::test]
    async fn test_cancel_cascades_to_active_builds() {
        let f = fixture();
        let (pipeline, builds) = pipeline_with_builds(
            &f.store,
            &[BuildStatus::Success, BuildStatus::Running, BuildStatus::Pending],
        )
        .await;

        let result = f.coordinator.cancel(&pipeline).await.unwrap();
        assert!(result.is_applied());

        let cancelled = result.into_pipeline();
        assert_eq!(cancelled.status, PipelineStatus::Cancelled);
        assert!(!cancelled.cascade_pending);
        assert!(cancelled.finished_at.is_some());
        assert!(cancelled.duration.unwrap() >= 0);

        let statuses: Vec<BuildStatus> = f
            .store
            .list_builds(pipeline.id, BuildFilter::All)
            .await
            .unwrap()
            .iter()
            .map(|b| b.status)
            .collect();
        assert_eq!(
            statuses,
            vec![BuildStatus::Success, BuildStatus::Cancelled, BuildStatus::Cancelled]
        );
        assert_eq!(builds.len(), 3);
    }

    #[tokio::test]
    async fn test_partial_cascade_keeps_pipeline_cancelled() {
        let f = fixture();
        let (pipeline, builds) =
            pipeline_with_builds(&f.store, &[BuildStatus::Running, BuildStatus::Running]).await;
        f.canceller.stuck.lock().unwrap().insert(builds[1].id);

        let err = f.coordinator.cancel(&pipeline).await.unwrap_err();
        match &err {
            PipelineError::PartialCascadeFailure {
                pipeline: cancelled,
                failed_builds,
            } => {
                assert_eq!(cancelled.status, PipelineStatus::Cancelled);
                assert!(cancelled.cascade_pending);
                assert_eq!(failed_builds.len(), 1);
                assert_eq!(failed_builds[0].build_id, builds[1].id);
            }
            other => panic!("expected partial cascade failure, got {other:?}"),
        }

        let stored = f.store.get_pipeline(pipeline.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PipelineStatus::Cancelled);
        assert!(stored.cascade_pending);
        assert_eq!(
            f.store.get_build(builds[1].id).await.unwrap().unwrap().status,
            BuildStatus::Running
        );

        // Once the runner is reachable again the compensating retry finishes
        f.canceller.stuck.lock().unwrap().clear();
        let retried = f.coordinator.cancel(&stored).await.unwrap();
        assert!(!retried.pipeline().cascade_pending);
        assert_eq!(retried.pipeline().finished_at, stored.finished_at);
        assert_eq!(
            f.store.get_build(builds[1].id).await.unwrap().unwrap().status,
            BuildStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_cancel_terminal_pipeline_is_noop() {
        let f = fixture();
        let (pipeline, _) = pipeline_with_builds(&f.store, &[BuildStatus::Success]).await;
        let succeeded = f
            .store
            .update_pipeline(
                pipeline.id,
                PipelineChanges::default()
                    .status(PipelineStatus::Success)
                    .finished(chrono::Utc::now(), 1),
            )
            .await
            .unwrap();

        let result = f.coordinator.cancel(&succeeded).await.unwrap();
        assert_eq!(result, Transition::Unchanged(succeeded.clone()));
        assert_eq!(
            f.store.get_pipeline(pipeline.id).await.unwrap().unwrap(),
            succeeded
        );
    }

    #[tokio::test]
    async fn test_cancel_pending_pipeline_records_start() {
        let f = fixture();
        let pending = f
            .store
            .insert_pipeline(NewPipeline {
                project_id: 1,
                ref_name: "main".to_string(),
                sha: "cafebabe".to_string(),
                before_sha: None,
                tag: false,
                trigger_user_id: None,
            })
            .await
            .unwrap();

        let cancelled = f.coordinator.cancel(&pending).await.unwrap().into_pipeline();
        assert_eq!(cancelled.status, PipelineStatus::Cancelled);
        assert!(cancelled.started_at.is_some());
        assert_eq!(cancelled.started_at, cancelled.finished_at);
        assert_eq!(cancelled.duration, Some(0));
    }

    #[tokio::test]
    async fn test_cancel_with_stale_snapshot_uses_current_state() {
        let f = fixture();
        let (pipeline, _) = pipeline_with_builds(&f.store, &[BuildStatus::Success]).await;
        f.store
            .update_pipeline(
                pipeline.id,
                PipelineChanges::default()
                    .status(PipelineStatus::Failed)
                    .finished(chrono::Utc::now(), 0),
            )
            .await
            .unwrap();

        let result = f.coordinator.cancel(&pipeline).await.unwrap();
        assert!(!result.is_applied());
        assert_eq!(result.pipeline().status, PipelineStatus::Failed);
    }
}
