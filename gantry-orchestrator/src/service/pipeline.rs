//! Pipeline Service
//!
//! Entry points for everything that changes a pipeline: build completion
//! reports, sweeps, run, cancel and retry. Each operation holds the
//! pipeline's guard for its whole read-decide-write sequence.

use std::sync::Arc;

use gantry_core::domain::build::{Build, BuildStatus};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::build::NewBuild;
use gantry_core::dto::pipeline::NewPipeline;

use super::aggregator::{self, Verdict};
use super::cancel::{BuildCanceller, CancellationCoordinator};
use super::duplicate::DuplicationService;
use super::locks::PipelineLocks;
use super::registry::BuildStatusRegistry;
use super::transition::{Transition, TransitionController};
use super::{PipelineError, Result};
use crate::clock::Clock;
use crate::dispatch::Dispatcher;
use crate::notify::Notifier;
use crate::repository::Store;
use crate::repository::validation::validate_report;

/// External collaborators the service calls out to
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub canceller: Arc<dyn BuildCanceller>,
    pub clock: Arc<dyn Clock>,
    /// Queue receiving build-creation jobs
    pub queue: String,
}

pub struct PipelineService {
    store: Arc<dyn Store>,
    locks: PipelineLocks,
    registry: BuildStatusRegistry,
    controller: TransitionController,
    cancellation: CancellationCoordinator,
    duplication: DuplicationService,
}

impl PipelineService {
    pub fn new(store: Arc<dyn Store>, collaborators: Collaborators) -> Self {
        let Collaborators {
            notifier,
            dispatcher,
            canceller,
            clock,
            queue,
        } = collaborators;

        Self {
            locks: PipelineLocks::new(),
            registry: BuildStatusRegistry::new(store.clone()),
            controller: TransitionController::new(store.clone(), notifier, clock.clone()),
            cancellation: CancellationCoordinator::new(store.clone(), canceller, clock),
            duplication: DuplicationService::new(store.clone(), dispatcher, queue),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &BuildStatusRegistry {
        &self.registry
    }

    /// Get a pipeline by ID; `None` when absent
    pub async fn get_pipeline(&self, id: i64) -> Result<Option<Pipeline>> {
        Ok(self.store.get_pipeline(id).await?)
    }

    /// Create a new pending pipeline for a commit
    pub async fn create_pipeline(&self, new: NewPipeline) -> Result<Pipeline> {
        let pipeline = self.store.insert_pipeline(new).await?;
        tracing::info!(
            pipeline_id = pipeline.id,
            project_id = pipeline.project_id,
            sha = %pipeline.sha,
            "Pipeline created"
        );
        Ok(pipeline)
    }

    /// Attach a pending build to a pipeline
    pub async fn add_build(&self, new: NewBuild) -> Result<Build> {
        let build = self.store.insert_build(new).await?;
        tracing::debug!(build_id = build.id, pipeline_id = build.pipeline_id, "Build created");
        Ok(build)
    }

    /// pending -> running
    pub async fn run(&self, pipeline_id: i64) -> Result<Transition> {
        let _guard = self.locks.lock(pipeline_id).await;
        let pipeline = self.require(pipeline_id).await?;
        self.controller.run(&pipeline).await
    }

    /// Record a worker's report and re-evaluate the owning pipeline
    pub async fn report_build(&self, build_id: i64, status: BuildStatus) -> Result<Transition> {
        validate_report(status).map_err(PipelineError::Validation)?;

        let build = self.store.update_build_status(build_id, status).await?;
        tracing::debug!(
            build_id,
            pipeline_id = build.pipeline_id,
            status = %status,
            "Build status reported"
        );

        self.update_status(build.pipeline_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "pipeline",
                id: build.pipeline_id,
            })
    }

    /// Status-update event: decide from the most recent build, confirming
    /// against the full counts when that alone decides nothing, and apply
    ///
    /// `Ok(None)` when the pipeline does not exist.
    pub async fn update_status(&self, pipeline_id: i64) -> Result<Option<Transition>> {
        self.evaluate(pipeline_id, aggregator::decide_event).await
    }

    /// Re-check a pipeline against its full build counts
    pub async fn sweep(&self, pipeline_id: i64) -> Result<Option<Transition>> {
        self.evaluate(pipeline_id, aggregator::decide_sweep).await
    }

    /// Sweep every non-terminal pipeline, returning how many transitioned
    ///
    /// A failure on one pipeline is logged and does not stop the others.
    pub async fn sweep_active(&self) -> Result<usize> {
        let pipelines = self.store.list_active_pipelines().await?;

        let mut applied = 0;
        for pipeline in pipelines {
            match self.sweep(pipeline.id).await {
                Ok(Some(transition)) if transition.is_applied() => applied += 1,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(pipeline_id = pipeline.id, "Sweep failed: {}", err);
                }
            }
        }

        Ok(applied)
    }

    /// Cancel a pipeline and cascade to its active builds
    pub async fn cancel(&self, pipeline_id: i64) -> Result<Transition> {
        let _guard = self.locks.lock(pipeline_id).await;
        let pipeline = self.require(pipeline_id).await?;
        self.cancellation.cancel(&pipeline).await
    }

    /// Retry the cascade of every pipeline whose cancellation is incomplete,
    /// returning how many completed
    pub async fn retry_pending_cascades(&self) -> Result<usize> {
        let pipelines = self.store.list_cascade_pending().await?;

        let mut completed = 0;
        for pipeline in pipelines {
            match self.retry_cascade(pipeline.id).await {
                Ok(true) => completed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(pipeline_id = pipeline.id, "Cascade retry incomplete: {}", err);
                }
            }
        }

        Ok(completed)
    }

    async fn retry_cascade(&self, pipeline_id: i64) -> Result<bool> {
        let _guard = self.locks.lock(pipeline_id).await;
        let Some(current) = self.store.get_pipeline(pipeline_id).await? else {
            return Ok(false);
        };

        let transition = self.cancellation.retry_cascade(&current).await?;
        Ok(transition.is_applied())
    }

    /// Retry a pipeline as a new pending pipeline
    pub async fn duplicate(&self, pipeline_id: i64) -> Result<Pipeline> {
        let source = self.require(pipeline_id).await?;
        self.duplication.duplicate(&source).await
    }

    async fn evaluate(
        &self,
        pipeline_id: i64,
        decide: fn(&Pipeline, &super::RegistrySnapshot) -> Verdict,
    ) -> Result<Option<Transition>> {
        let _guard = self.locks.lock(pipeline_id).await;

        let Some(pipeline) = self.store.get_pipeline(pipeline_id).await? else {
            tracing::debug!(pipeline_id, "Status update for unknown pipeline");
            return Ok(None);
        };

        if pipeline.is_terminal() {
            return Ok(Some(Transition::Unchanged(pipeline)));
        }

        let snapshot = self.registry.snapshot(pipeline_id).await?;
        let verdict = decide(&pipeline, &snapshot);
        tracing::debug!(
            pipeline_id,
            most_recent = ?snapshot.most_recent.build_id,
            status = %snapshot.most_recent.status,
            success = snapshot.success_count,
            allowed_failures = snapshot.allowed_failure_count,
            total = snapshot.total,
            ?verdict,
            "Pipeline evaluated"
        );

        self.controller.apply_verdict(&pipeline, verdict).await.map(Some)
    }

    async fn require(&self, pipeline_id: i64) -> Result<Pipeline> {
        self.store
            .get_pipeline(pipeline_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "pipeline",
                id: pipeline_id,
            })
    }
}
