//! In-process [`Store`]
//!
//! Backs the orchestrator's in-memory mode and the test suite. Writes are
//! validated exactly like the Postgres store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gantry_core::domain::build::{Build, BuildStatus};
use gantry_core::domain::pipeline::{Pipeline, PipelineStatus};
use gantry_core::dto::build::NewBuild;
use gantry_core::dto::pipeline::{NewPipeline, PipelineChanges};
use tokio::sync::RwLock;

use super::validation::{validate_changes, validate_new_build, validate_new_pipeline};
use super::{BuildFilter, Store, StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pipelines: BTreeMap<i64, Pipeline>,
    builds: BTreeMap<i64, Build>,
    next_pipeline_id: i64,
    next_build_id: i64,
    last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Strictly increasing write timestamps, so "most recently updated" is
    /// unambiguous even for writes within the same clock tick
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_pipeline(&self, id: i64) -> StoreResult<Option<Pipeline>> {
        Ok(self.inner.read().await.pipelines.get(&id).cloned())
    }

    async fn get_build(&self, id: i64) -> StoreResult<Option<Build>> {
        Ok(self.inner.read().await.builds.get(&id).cloned())
    }

    async fn count_builds(&self, pipeline_id: i64, filter: BuildFilter) -> StoreResult<i64> {
        let inner = self.inner.read().await;
        let count = inner
            .builds
            .values()
            .filter(|b| b.pipeline_id == pipeline_id && filter.matches(b))
            .count();
        Ok(count as i64)
    }

    async fn most_recent_build(&self, pipeline_id: i64) -> StoreResult<Option<Build>> {
        let inner = self.inner.read().await;
        let build = inner
            .builds
            .values()
            .filter(|b| b.pipeline_id == pipeline_id && b.status.is_reportable())
            .max_by_key(|b| (b.updated_at, b.id))
            .cloned();
        Ok(build)
    }

    async fn list_builds(&self, pipeline_id: i64, filter: BuildFilter) -> StoreResult<Vec<Build>> {
        let inner = self.inner.read().await;
        Ok(inner
            .builds
            .values()
            .filter(|b| b.pipeline_id == pipeline_id && filter.matches(b))
            .cloned()
            .collect())
    }

    async fn update_pipeline(&self, id: i64, changes: PipelineChanges) -> StoreResult<Pipeline> {
        let mut inner = self.inner.write().await;
        let stamp = inner.stamp();

        let pipeline = inner.pipelines.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "pipeline",
            id,
        })?;

        validate_changes(pipeline, &changes)?;

        if let Some(expected) = changes.expected_status {
            if pipeline.status != expected {
                return Err(StoreError::Conflict {
                    id,
                    expected,
                    actual: pipeline.status,
                });
            }
        }

        if let Some(status) = changes.status {
            pipeline.status = status;
        }
        if let Some(started_at) = changes.started_at {
            pipeline.started_at = Some(started_at);
        }
        if let Some(finished_at) = changes.finished_at {
            pipeline.finished_at = Some(finished_at);
        }
        if let Some(duration) = changes.duration {
            pipeline.duration = Some(duration);
        }
        if let Some(pending) = changes.cascade_pending {
            pipeline.cascade_pending = pending;
        }
        pipeline.updated_at = stamp;

        Ok(pipeline.clone())
    }

    async fn insert_pipeline(&self, new: NewPipeline) -> StoreResult<Pipeline> {
        validate_new_pipeline(&new)?;

        let mut inner = self.inner.write().await;
        let now = inner.stamp();
        inner.next_pipeline_id += 1;

        let pipeline = Pipeline {
            id: inner.next_pipeline_id,
            project_id: new.project_id,
            ref_name: new.ref_name,
            sha: new.sha,
            before_sha: new.before_sha,
            tag: new.tag,
            trigger_user_id: new.trigger_user_id,
            status: PipelineStatus::Pending,
            started_at: None,
            finished_at: None,
            duration: None,
            cascade_pending: false,
            created_at: now,
            updated_at: now,
        };
        inner.pipelines.insert(pipeline.id, pipeline.clone());

        Ok(pipeline)
    }

    async fn insert_build(&self, new: NewBuild) -> StoreResult<Build> {
        validate_new_build(&new)?;

        let mut inner = self.inner.write().await;
        if !inner.pipelines.contains_key(&new.pipeline_id) {
            return Err(StoreError::NotFound {
                entity: "pipeline",
                id: new.pipeline_id,
            });
        }

        let now = inner.stamp();
        inner.next_build_id += 1;

        let build = Build {
            id: inner.next_build_id,
            pipeline_id: new.pipeline_id,
            name: new.name,
            stage: new.stage,
            status: BuildStatus::Pending,
            allow_failure: new.allow_failure,
            created_at: now,
            updated_at: now,
        };
        inner.builds.insert(build.id, build.clone());

        Ok(build)
    }

    async fn update_build_status(&self, id: i64, status: BuildStatus) -> StoreResult<Build> {
        let mut inner = self.inner.write().await;
        let stamp = inner.stamp();

        let build = inner
            .builds
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "build", id })?;
        build.status = status;
        build.updated_at = stamp;

        Ok(build.clone())
    }

    async fn list_active_pipelines(&self) -> StoreResult<Vec<Pipeline>> {
        let inner = self.inner.read().await;
        Ok(inner
            .pipelines
            .values()
            .filter(|p| !p.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_cascade_pending(&self) -> StoreResult<Vec<Pipeline>> {
        let inner = self.inner.read().await;
        Ok(inner
            .pipelines
            .values()
            .filter(|p| p.cascade_pending)
            .cloned()
            .collect())
    }
}
