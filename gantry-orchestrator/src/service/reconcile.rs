//! Background reconciler
//!
//! Periodically re-checks active pipelines and retries unfinished
//! cancellation cascades, so missed or failed events converge.

use std::sync::Arc;

use tokio::time::{self, Duration};
use tracing::{debug, error, info};

use super::pipeline::PipelineService;
use super::Result;

/// Outcome of one reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub transitioned: usize,
    pub cascades_completed: usize,
}

/// Run one sweep and one cascade retry pass
pub async fn reconcile_once(service: &PipelineService) -> Result<ReconcileReport> {
    let transitioned = service.sweep_active().await?;
    let cascades_completed = service.retry_pending_cascades().await?;

    Ok(ReconcileReport {
        transitioned,
        cascades_completed,
    })
}

/// Reconcile forever, once per `interval`
pub async fn run(service: Arc<PipelineService>, interval: Duration) {
    info!("Starting reconciler (interval: {:?})", interval);

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        debug!("Reconciling pipelines");

        match reconcile_once(&service).await {
            Ok(report) => {
                if report != ReconcileReport::default() {
                    info!(
                        "Reconciled {} pipeline(s), completed {} cancellation(s)",
                        report.transitioned, report.cascades_completed
                    );
                }
            }
            Err(e) => {
                error!("Error during reconcile cycle: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::dispatch::QueueDispatcher;
    use crate::notify::LogNotifier;
    use crate::repository::{MemoryStore, Store};
    use crate::service::{Collaborators, StoreBuildCanceller};
    use gantry_core::domain::build::BuildStatus;
    use gantry_core::domain::pipeline::PipelineStatus;
    use gantry_core::dto::build::NewBuild;
    use gantry_core::dto::pipeline::{NewPipeline, PipelineChanges};

    #[tokio::test]
    async fn test_reconcile_once_converges() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, _queue) = QueueDispatcher::new(false);
        let service = PipelineService::new(
            store.clone(),
            Collaborators {
                notifier: Arc::new(LogNotifier),
                dispatcher: Arc::new(dispatcher),
                canceller: Arc::new(StoreBuildCanceller::new(store.clone())),
                clock: Arc::new(SystemClock),
                queue: "default".to_string(),
            },
        );

        let new = |sha: &str| NewPipeline {
            project_id: 1,
            ref_name: "main".to_string(),
            sha: sha.to_string(),
            before_sha: None,
            tag: false,
            trigger_user_id: None,
        };

        // A running pipeline whose only build finished without a report
        let finished = service.create_pipeline(new("aaaa1111")).await.unwrap();
        service.run(finished.id).await.unwrap();
        let build = service
            .add_build(NewBuild {
                pipeline_id: finished.id,
                name: "test".to_string(),
                stage: None,
                allow_failure: false,
            })
            .await
            .unwrap();
        store.update_build_status(build.id, BuildStatus::Success).await.unwrap();

        // A cancelled pipeline whose cascade never completed
        let cancelled = service.create_pipeline(new("bbbb2222")).await.unwrap();
        let stuck = service
            .add_build(NewBuild {
                pipeline_id: cancelled.id,
                name: "deploy".to_string(),
                stage: None,
                allow_failure: false,
            })
            .await
            .unwrap();
        store
            .update_pipeline(
                cancelled.id,
                PipelineChanges::default()
                    .status(PipelineStatus::Cancelled)
                    .finished(chrono::Utc::now(), 0)
                    .cascade_pending(true),
            )
            .await
            .unwrap();

        let report = reconcile_once(&service).await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                transitioned: 1,
                cascades_completed: 1,
            }
        );
        assert_eq!(
            store.get_pipeline(finished.id).await.unwrap().unwrap().status,
            PipelineStatus::Success
        );
        assert_eq!(
            store.get_build(stuck.id).await.unwrap().unwrap().status,
            BuildStatus::Cancelled
        );

        assert_eq!(reconcile_once(&service).await.unwrap(), ReconcileReport::default());
    }
}
