//! Transition Controller
//!
//! Applies verdicts to a pipeline as guarded writes. Terminal pipelines are
//! never written again, which is also what keeps notifications to one per
//! pipeline. Callers hold the pipeline's guard from [`super::locks`] around
//! decide-then-apply; the store's status guard backs that up across
//! processes.

use std::sync::Arc;

use gantry_core::domain::pipeline::{Pipeline, PipelineStatus};
use gantry_core::dto::pipeline::PipelineChanges;

use super::aggregator::Verdict;
use super::{PipelineError, Result};
use crate::clock::Clock;
use crate::notify::Notifier;
use crate::repository::{Store, StoreError};

/// Outcome of a transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The pipeline was written; carries the stored result
    Applied(Pipeline),
    /// Nothing to do, or the pipeline was already terminal
    Unchanged(Pipeline),
}

impl Transition {
    pub fn pipeline(&self) -> &Pipeline {
        match self {
            Transition::Applied(p) | Transition::Unchanged(p) => p,
        }
    }

    pub fn into_pipeline(self) -> Pipeline {
        match self {
            Transition::Applied(p) | Transition::Unchanged(p) => p,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

#[derive(Clone)]
pub struct TransitionController {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl TransitionController {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// pending -> running
    pub async fn run(&self, pipeline: &Pipeline) -> Result<Transition> {
        if pipeline.status != PipelineStatus::Pending {
            return Ok(Transition::Unchanged(pipeline.clone()));
        }
        self.enter_running(pipeline).await
    }

    pub async fn apply_verdict(&self, pipeline: &Pipeline, verdict: Verdict) -> Result<Transition> {
        if pipeline.is_terminal() {
            tracing::debug!(
                pipeline_id = pipeline.id,
                status = %pipeline.status,
                ?verdict,
                "Ignoring verdict for terminal pipeline"
            );
            return Ok(Transition::Unchanged(pipeline.clone()));
        }

        match verdict {
            Verdict::EnterRunning => self.enter_running(pipeline).await,
            Verdict::Succeed => self.finish(pipeline, PipelineStatus::Success).await,
            Verdict::Fail => self.finish(pipeline, PipelineStatus::Failed).await,
            Verdict::NoOp => Ok(Transition::Unchanged(pipeline.clone())),
        }
    }

    async fn enter_running(&self, pipeline: &Pipeline) -> Result<Transition> {
        // Already running keeps its original started_at
        if pipeline.status != PipelineStatus::Pending {
            return Ok(Transition::Unchanged(pipeline.clone()));
        }

        let changes = PipelineChanges::expecting(PipelineStatus::Pending)
            .status(PipelineStatus::Running)
            .started_at(self.clock.now());

        let Some(updated) = self.write(pipeline, changes).await? else {
            return self.reread(pipeline.id).await.map(Transition::Unchanged);
        };

        tracing::info!(pipeline_id = updated.id, "Pipeline running");
        Ok(Transition::Applied(updated))
    }

    async fn finish(&self, pipeline: &Pipeline, status: PipelineStatus) -> Result<Transition> {
        let (finished_at, duration) = finish_times(pipeline, self.clock.now());
        let changes = started_if_pending(
            pipeline,
            PipelineChanges::expecting(pipeline.status)
                .status(status)
                .finished(finished_at, duration),
        );

        let Some(updated) = self.write(pipeline, changes).await? else {
            return self.reread(pipeline.id).await.map(Transition::Unchanged);
        };

        tracing::info!(
            pipeline_id = updated.id,
            status = %status,
            duration,
            "Pipeline finished"
        );

        // The transition above is durable; a notifier failure is reported
        // but does not undo it.
        let notified = match status {
            PipelineStatus::Success => self.notifier.notify_success(updated.project_id, &updated).await,
            _ => self.notifier.notify_failure(updated.project_id, &updated).await,
        };
        if let Err(err) = notified {
            tracing::warn!(pipeline_id = updated.id, "Notification failed: {:#}", err);
            return Err(PipelineError::external("notifier", &updated, err));
        }

        Ok(Transition::Applied(updated))
    }

    /// Guarded write; `None` when another writer got there first
    async fn write(&self, pipeline: &Pipeline, changes: PipelineChanges) -> Result<Option<Pipeline>> {
        match self.store.update_pipeline(pipeline.id, changes).await {
            Ok(updated) => Ok(Some(updated)),
            Err(StoreError::Conflict { actual, .. }) => {
                tracing::warn!(
                    pipeline_id = pipeline.id,
                    observed = %pipeline.status,
                    actual = %actual,
                    "Pipeline changed concurrently, transition skipped"
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn reread(&self, id: i64) -> Result<Pipeline> {
        self.store
            .get_pipeline(id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "pipeline",
                id,
            })
    }
}

/// `finished_at` and whole-second duration for a pipeline ending at `now`
///
/// A pipeline that never ran has a duration of zero; a clock that reads
/// earlier than `started_at` is clamped to it.
pub(crate) fn finish_times(
    pipeline: &Pipeline,
    now: chrono::DateTime<chrono::Utc>,
) -> (chrono::DateTime<chrono::Utc>, i64) {
    match pipeline.started_at {
        Some(started) => {
            let finished = now.max(started);
            (finished, (finished - started).num_seconds())
        }
        None => (now, 0),
    }
}

/// A pipeline finishing straight from pending passes through running in
/// the same write, starting at the instant it finishes
pub(crate) fn started_if_pending(pipeline: &Pipeline, changes: PipelineChanges) -> PipelineChanges {
    match (pipeline.started_at, changes.finished_at) {
        (None, Some(finished_at)) => changes.started_at(finished_at),
        _ => changes,
    }
}
