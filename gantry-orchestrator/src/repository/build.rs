//! Build Repository
//!
//! Handles all database operations related to builds.

use chrono::{DateTime, Utc};
use gantry_core::domain::build::{Build, BuildStatus};
use gantry_core::dto::build::NewBuild;
use sqlx::PgPool;

use super::BuildFilter;

const BUILD_COLUMNS: &str =
    "id, pipeline_id, name, stage, status, allow_failure, created_at, updated_at";

/// Attach a new pending build to a pipeline
pub async fn create(pool: &PgPool, new: &NewBuild) -> Result<Build, sqlx::Error> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, BuildRow>(&format!(
        r#"
        INSERT INTO builds (pipeline_id, name, stage, status, allow_failure, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        RETURNING {BUILD_COLUMNS}
        "#
    ))
    .bind(new.pipeline_id)
    .bind(&new.name)
    .bind(&new.stage)
    .bind(BuildStatus::Pending.as_str())
    .bind(new.allow_failure)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Find a build by ID
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Build>, sqlx::Error> {
    let row = sqlx::query_as::<_, BuildRow>(&format!(
        "SELECT {BUILD_COLUMNS} FROM builds WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find the builds of a pipeline matching `filter`, in creation order
pub async fn find_by_pipeline(
    pool: &PgPool,
    pipeline_id: i64,
    filter: BuildFilter,
) -> Result<Vec<Build>, sqlx::Error> {
    let (clause, status) = filter_clause(filter);

    let rows = sqlx::query_as::<_, BuildRow>(&format!(
        r#"
        SELECT {BUILD_COLUMNS}
        FROM builds
        WHERE pipeline_id = $1 AND {clause} AND ($2::VARCHAR IS NULL OR status = $2)
        ORDER BY id ASC
        "#
    ))
    .bind(pipeline_id)
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Count the builds of a pipeline matching `filter`
pub async fn count(pool: &PgPool, pipeline_id: i64, filter: BuildFilter) -> Result<i64, sqlx::Error> {
    let (clause, status) = filter_clause(filter);

    let (count,): (i64,) = sqlx::query_as(&format!(
        r#"
        SELECT COUNT(*)
        FROM builds
        WHERE pipeline_id = $1 AND {clause} AND ($2::VARCHAR IS NULL OR status = $2)
        "#
    ))
    .bind(pipeline_id)
    .bind(status)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Most recently updated reportable build, newest id first on ties
pub async fn find_most_recent(pool: &PgPool, pipeline_id: i64) -> Result<Option<Build>, sqlx::Error> {
    let statuses: Vec<&str> = BuildStatus::REPORTABLE.iter().map(|s| s.as_str()).collect();

    let row = sqlx::query_as::<_, BuildRow>(&format!(
        r#"
        SELECT {BUILD_COLUMNS}
        FROM builds
        WHERE pipeline_id = $1 AND status = ANY($2)
        ORDER BY updated_at DESC, id DESC
        LIMIT 1
        "#
    ))
    .bind(pipeline_id)
    .bind(statuses)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Update build status
pub async fn update_status(
    pool: &PgPool,
    id: i64,
    status: BuildStatus,
) -> Result<Option<Build>, sqlx::Error> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, BuildRow>(&format!(
        r#"
        UPDATE builds
        SET status = $1, updated_at = $2
        WHERE id = $3
        RETURNING {BUILD_COLUMNS}
        "#
    ))
    .bind(status.as_str())
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// SQL fragment for `filter` plus the status bound to `$2`, if any
fn filter_clause(filter: BuildFilter) -> (&'static str, Option<&'static str>) {
    match filter {
        BuildFilter::All => ("TRUE", None),
        BuildFilter::Status(status) => ("TRUE", Some(status.as_str())),
        BuildFilter::AllowedFailure => ("status = 'failed' AND allow_failure", None),
        BuildFilter::BlockingFailure => ("status = 'failed' AND NOT allow_failure", None),
        BuildFilter::Active => ("status IN ('pending', 'running')", None),
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct BuildRow {
    id: i64,
    pipeline_id: i64,
    name: String,
    stage: Option<String>,
    status: String,
    allow_failure: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BuildRow> for Build {
    fn from(row: BuildRow) -> Self {
        let status = BuildStatus::parse(&row.status).unwrap_or_else(|| {
            tracing::warn!("Build {} has unknown status {:?}", row.id, row.status);
            BuildStatus::Pending
        });

        Build {
            id: row.id,
            pipeline_id: row.pipeline_id,
            name: row.name,
            stage: row.stage,
            status,
            allow_failure: row.allow_failure,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
