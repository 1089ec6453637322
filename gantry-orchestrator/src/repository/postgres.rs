//! Postgres-backed [`Store`]

use async_trait::async_trait;
use gantry_core::domain::build::{Build, BuildStatus};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::build::NewBuild;
use gantry_core::dto::pipeline::{NewPipeline, PipelineChanges};
use sqlx::PgPool;

use super::validation::{validate_changes, validate_new_build, validate_new_pipeline};
use super::{BuildFilter, Store, StoreError, StoreResult, build_repository, pipeline_repository};

/// Store persisting pipelines and builds in Postgres
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_pipeline(&self, id: i64) -> StoreResult<Option<Pipeline>> {
        Ok(pipeline_repository::find_by_id(&self.pool, id).await?)
    }

    async fn get_build(&self, id: i64) -> StoreResult<Option<Build>> {
        Ok(build_repository::find_by_id(&self.pool, id).await?)
    }

    async fn count_builds(&self, pipeline_id: i64, filter: BuildFilter) -> StoreResult<i64> {
        Ok(build_repository::count(&self.pool, pipeline_id, filter).await?)
    }

    async fn most_recent_build(&self, pipeline_id: i64) -> StoreResult<Option<Build>> {
        Ok(build_repository::find_most_recent(&self.pool, pipeline_id).await?)
    }

    async fn list_builds(&self, pipeline_id: i64, filter: BuildFilter) -> StoreResult<Vec<Build>> {
        Ok(build_repository::find_by_pipeline(&self.pool, pipeline_id, filter).await?)
    }

    async fn update_pipeline(&self, id: i64, changes: PipelineChanges) -> StoreResult<Pipeline> {
        let current = pipeline_repository::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "pipeline",
                id,
            })?;

        validate_changes(&current, &changes)?;

        if let Some(updated) = pipeline_repository::update(&self.pool, id, &changes).await? {
            return Ok(updated);
        }

        // Nothing matched: the guard lost a race, or the row was deleted
        match pipeline_repository::find_by_id(&self.pool, id).await? {
            Some(actual) => Err(StoreError::Conflict {
                id,
                expected: changes.expected_status.unwrap_or(current.status),
                actual: actual.status,
            }),
            None => Err(StoreError::NotFound {
                entity: "pipeline",
                id,
            }),
        }
    }

    async fn insert_pipeline(&self, new: NewPipeline) -> StoreResult<Pipeline> {
        validate_new_pipeline(&new)?;
        Ok(pipeline_repository::create(&self.pool, &new).await?)
    }

    async fn insert_build(&self, new: NewBuild) -> StoreResult<Build> {
        validate_new_build(&new)?;

        if pipeline_repository::find_by_id(&self.pool, new.pipeline_id)
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound {
                entity: "pipeline",
                id: new.pipeline_id,
            });
        }

        Ok(build_repository::create(&self.pool, &new).await?)
    }

    async fn update_build_status(&self, id: i64, status: BuildStatus) -> StoreResult<Build> {
        build_repository::update_status(&self.pool, id, status)
            .await?
            .ok_or(StoreError::NotFound { entity: "build", id })
    }

    async fn list_active_pipelines(&self) -> StoreResult<Vec<Pipeline>> {
        Ok(pipeline_repository::find_active(&self.pool).await?)
    }

    async fn list_cascade_pending(&self) -> StoreResult<Vec<Pipeline>> {
        Ok(pipeline_repository::find_cascade_pending(&self.pool).await?)
    }
}
