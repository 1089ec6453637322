//! Handler test fixtures

use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::domain::build::{Build, BuildStatus};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::build::NewBuild;
use gantry_core::dto::pipeline::NewPipeline;

use crate::api::AppState;
use crate::auth::Authorizer;
use crate::clock::SystemClock;
use crate::dispatch::QueueDispatcher;
use crate::notify::LogNotifier;
use crate::repository::{MemoryStore, Store};
use crate::service::{Collaborators, PipelineService, StoreBuildCanceller};

pub const PROJECT_ID: i64 = 10;

/// User 1 maintains the project, user 2 is a reporter
struct Members;

#[async_trait]
impl Authorizer for Members {
    async fn can_access(&self, project_id: i64, user_id: i64) -> anyhow::Result<bool> {
        Ok(project_id == PROJECT_ID && (user_id == 1 || user_id == 2))
    }

    async fn can_manage(&self, project_id: i64, user_id: i64) -> anyhow::Result<bool> {
        Ok(project_id == PROJECT_ID && user_id == 1)
    }
}

pub fn state() -> AppState {
    let store = Arc::new(MemoryStore::new());
    let (dispatcher, _queue) = QueueDispatcher::new(false);
    let service = PipelineService::new(
        store.clone(),
        Collaborators {
            notifier: Arc::new(LogNotifier),
            dispatcher: Arc::new(dispatcher),
            canceller: Arc::new(StoreBuildCanceller::new(store)),
            clock: Arc::new(SystemClock),
            queue: "default".to_string(),
        },
    );

    AppState {
        service: Arc::new(service),
        authorizer: Arc::new(Members),
    }
}

/// A running pipeline with one build per given status
pub async fn seed(state: &AppState, statuses: &[BuildStatus]) -> (Pipeline, Vec<Build>) {
    let service = &state.service;
    let pipeline = service
        .create_pipeline(NewPipeline {
            project_id: PROJECT_ID,
            ref_name: "main".to_string(),
            sha: "deadbeef".to_string(),
            before_sha: None,
            tag: false,
            trigger_user_id: Some(1),
        })
        .await
        .unwrap();

    let mut builds = Vec::new();
    for (i, status) in statuses.iter().enumerate() {
        let build = service
            .add_build(NewBuild {
                pipeline_id: pipeline.id,
                name: format!("build-{i}"),
                stage: Some("test".to_string()),
                allow_failure: false,
            })
            .await
            .unwrap();
        builds.push(
            service
                .store()
                .update_build_status(build.id, *status)
                .await
                .unwrap(),
        );
    }

    let pipeline = service.run(pipeline.id).await.unwrap().into_pipeline();
    (pipeline, builds)
}
