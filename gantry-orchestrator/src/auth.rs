//! Project authorization lookups
//!
//! Consumed by the boundary only; the pipeline state machine never asks.

use async_trait::async_trait;
use sqlx::PgPool;

/// Minimum member access level that may read pipelines
pub const GUEST_ACCESS: i32 = 10;
/// Minimum member access level that may cancel or retry pipelines
pub const MAINTAINER_ACCESS: i32 = 40;

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn can_access(&self, project_id: i64, user_id: i64) -> anyhow::Result<bool>;

    async fn can_manage(&self, project_id: i64, user_id: i64) -> anyhow::Result<bool>;
}

/// Permits every user on every project
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAuthorizer;

#[async_trait]
impl Authorizer for OpenAuthorizer {
    async fn can_access(&self, _project_id: i64, _user_id: i64) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn can_manage(&self, _project_id: i64, _user_id: i64) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Authorizer reading the `project_members` table
#[derive(Debug, Clone)]
pub struct MembershipAuthorizer {
    pool: PgPool,
}

impl MembershipAuthorizer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn access_level(&self, project_id: i64, user_id: i64) -> anyhow::Result<Option<i32>> {
        let level: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT access_level
            FROM project_members
            WHERE project_id = $1 AND user_id = $2
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(level.map(|(level,)| level))
    }
}

#[async_trait]
impl Authorizer for MembershipAuthorizer {
    async fn can_access(&self, project_id: i64, user_id: i64) -> anyhow::Result<bool> {
        let level = self.access_level(project_id, user_id).await?;
        Ok(level.is_some_and(|l| l >= GUEST_ACCESS))
    }

    async fn can_manage(&self, project_id: i64, user_id: i64) -> anyhow::Result<bool> {
        let level = self.access_level(project_id, user_id).await?;
        Ok(level.is_some_and(|l| l >= MAINTAINER_ACCESS))
    }
}
