//! Repository Module
//!
//! Data access layer for the orchestrator.
//! The services only talk to the [`Store`] trait; `PgStore` persists to
//! Postgres and `MemoryStore` keeps everything in process.

pub mod build;
pub mod memory;
pub mod pipeline;
pub mod postgres;
pub mod validation;

// Re-export for convenience
pub use build as build_repository;
pub use memory::MemoryStore;
pub use pipeline as pipeline_repository;
pub use postgres::PgStore;
pub use validation::{FieldError, ValidationErrors};

use async_trait::async_trait;
use gantry_core::domain::build::{Build, BuildStatus};
use gantry_core::domain::pipeline::{Pipeline, PipelineStatus};
use gantry_core::dto::build::NewBuild;
use gantry_core::dto::pipeline::{NewPipeline, PipelineChanges};
use thiserror::Error;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write was rejected because of invalid field values
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A guarded pipeline write found a different status than expected
    #[error("pipeline {id} is {actual}, expected {expected}")]
    Conflict {
        id: i64,
        expected: PipelineStatus,
        actual: PipelineStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ValidationErrors> for StoreError {
    fn from(errors: ValidationErrors) -> Self {
        StoreError::Validation(errors)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Predicate for build counts and listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFilter {
    All,
    Status(BuildStatus),
    /// Failed with `allow_failure` set
    AllowedFailure,
    /// Failed without `allow_failure`
    BlockingFailure,
    /// Pending or running
    Active,
}

impl BuildFilter {
    pub fn matches(self, build: &Build) -> bool {
        match self {
            BuildFilter::All => true,
            BuildFilter::Status(status) => build.status == status,
            BuildFilter::AllowedFailure => build.is_allowed_failure(),
            BuildFilter::BlockingFailure => {
                build.status == BuildStatus::Failed && !build.allow_failure
            }
            BuildFilter::Active => !build.status.is_terminal(),
        }
    }
}

/// Durable storage for pipelines and their builds
///
/// Every query reflects the latest committed state; implementations do not
/// cache.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_pipeline(&self, id: i64) -> StoreResult<Option<Pipeline>>;

    async fn get_build(&self, id: i64) -> StoreResult<Option<Build>>;

    async fn count_builds(&self, pipeline_id: i64, filter: BuildFilter) -> StoreResult<i64>;

    /// Most recently updated build in a reportable status, ties broken by
    /// the highest build id
    async fn most_recent_build(&self, pipeline_id: i64) -> StoreResult<Option<Build>>;

    async fn list_builds(&self, pipeline_id: i64, filter: BuildFilter) -> StoreResult<Vec<Build>>;

    async fn update_pipeline(&self, id: i64, changes: PipelineChanges) -> StoreResult<Pipeline>;

    async fn insert_pipeline(&self, new: NewPipeline) -> StoreResult<Pipeline>;

    async fn insert_build(&self, new: NewBuild) -> StoreResult<Build>;

    async fn update_build_status(&self, id: i64, status: BuildStatus) -> StoreResult<Build>;

    /// Pipelines that are still pending or running
    async fn list_active_pipelines(&self) -> StoreResult<Vec<Pipeline>>;

    /// Cancelled pipelines whose build cascade has not completed
    async fn list_cascade_pending(&self) -> StoreResult<Vec<Pipeline>>;
}
