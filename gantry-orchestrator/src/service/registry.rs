//! Build Status Registry
//!
//! Read-only projections over a pipeline's builds, taken fresh from the
//! store on every call.

use std::sync::Arc;

use gantry_core::domain::build::{Build, BuildStatus};

use crate::repository::{BuildFilter, Store, StoreResult};

/// Status of the build that triggered an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentBuild {
    /// `None` for the synthetic entry of a pipeline without builds
    pub build_id: Option<i64>,
    pub status: BuildStatus,
    pub allow_failure: bool,
}

impl RecentBuild {
    /// Stand-in used before any build has been attached
    pub const NONE: RecentBuild = RecentBuild {
        build_id: None,
        status: BuildStatus::Skipped,
        allow_failure: false,
    };
}

impl From<&Build> for RecentBuild {
    fn from(build: &Build) -> Self {
        Self {
            build_id: Some(build.id),
            status: build.status,
            allow_failure: build.allow_failure,
        }
    }
}

/// Counts and most recent build of one pipeline at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub most_recent: RecentBuild,
    pub success_count: i64,
    pub allowed_failure_count: i64,
    pub blocking_failure_count: i64,
    pub total: i64,
}

impl RegistrySnapshot {
    /// Every build succeeded or failed with permission, and there is at
    /// least one build
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.success_count + self.allowed_failure_count == self.total
    }
}

#[derive(Clone)]
pub struct BuildStatusRegistry {
    store: Arc<dyn Store>,
}

impl BuildStatusRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn most_recent(&self, pipeline_id: i64) -> StoreResult<RecentBuild> {
        let build = self.store.most_recent_build(pipeline_id).await?;
        Ok(build.as_ref().map(RecentBuild::from).unwrap_or(RecentBuild::NONE))
    }

    pub async fn success_count(&self, pipeline_id: i64) -> StoreResult<i64> {
        self.store
            .count_builds(pipeline_id, BuildFilter::Status(BuildStatus::Success))
            .await
    }

    pub async fn allowed_failure_count(&self, pipeline_id: i64) -> StoreResult<i64> {
        self.store
            .count_builds(pipeline_id, BuildFilter::AllowedFailure)
            .await
    }

    pub async fn total(&self, pipeline_id: i64) -> StoreResult<i64> {
        self.store.count_builds(pipeline_id, BuildFilter::All).await
    }

    pub async fn snapshot(&self, pipeline_id: i64) -> StoreResult<RegistrySnapshot> {
        Ok(RegistrySnapshot {
            most_recent: self.most_recent(pipeline_id).await?,
            success_count: self.success_count(pipeline_id).await?,
            allowed_failure_count: self.allowed_failure_count(pipeline_id).await?,
            blocking_failure_count: self
                .store
                .count_builds(pipeline_id, BuildFilter::BlockingFailure)
                .await?,
            total: self.total(pipeline_id).await?,
        })
    }
}
