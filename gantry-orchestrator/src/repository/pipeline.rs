//! Pipeline Repository
//!
//! Handles all database operations related to pipelines.

use chrono::{DateTime, Utc};
use gantry_core::domain::pipeline::{Pipeline, PipelineStatus};
use gantry_core::dto::pipeline::{NewPipeline, PipelineChanges};
use sqlx::PgPool;

const PIPELINE_COLUMNS: &str = r#"
    id, project_id, ref_name, sha, before_sha, tag, trigger_user_id, status,
    started_at, finished_at, duration, cascade_pending, created_at, updated_at
"#;

/// Create a new pending pipeline in the database
pub async fn create(pool: &PgPool, new: &NewPipeline) -> Result<Pipeline, sqlx::Error> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, PipelineRow>(&format!(
        r#"
        INSERT INTO pipelines (
            project_id, ref_name, sha, before_sha, tag, trigger_user_id,
            status, cascade_pending, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $8)
        RETURNING {PIPELINE_COLUMNS}
        "#
    ))
    .bind(new.project_id)
    .bind(&new.ref_name)
    .bind(&new.sha)
    .bind(&new.before_sha)
    .bind(new.tag)
    .bind(new.trigger_user_id)
    .bind(PipelineStatus::Pending.as_str())
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Find a pipeline by ID
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(&format!(
        "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find pipelines that have not reached a terminal status
pub async fn find_active(pool: &PgPool) -> Result<Vec<Pipeline>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRow>(&format!(
        r#"
        SELECT {PIPELINE_COLUMNS}
        FROM pipelines
        WHERE status IN ('pending', 'running')
        ORDER BY id ASC
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Find cancelled pipelines whose build cascade is incomplete
pub async fn find_cascade_pending(pool: &PgPool) -> Result<Vec<Pipeline>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRow>(&format!(
        r#"
        SELECT {PIPELINE_COLUMNS}
        FROM pipelines
        WHERE cascade_pending
        ORDER BY id ASC
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Apply a partial update
///
/// Returns `None` when no row matched, either because the pipeline is gone
/// or because its status no longer equals `changes.expected_status`.
pub async fn update(
    pool: &PgPool,
    id: i64,
    changes: &PipelineChanges,
) -> Result<Option<Pipeline>, sqlx::Error> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, PipelineRow>(&format!(
        r#"
        UPDATE pipelines
        SET status = COALESCE($1, status),
            started_at = COALESCE($2, started_at),
            finished_at = COALESCE($3, finished_at),
            duration = COALESCE($4, duration),
            cascade_pending = COALESCE($5, cascade_pending),
            updated_at = $6
        WHERE id = $7 AND ($8::VARCHAR IS NULL OR status = $8)
        RETURNING {PIPELINE_COLUMNS}
        "#
    ))
    .bind(changes.status.map(PipelineStatus::as_str))
    .bind(changes.started_at)
    .bind(changes.finished_at)
    .bind(changes.duration)
    .bind(changes.cascade_pending)
    .bind(now)
    .bind(id)
    .bind(changes.expected_status.map(PipelineStatus::as_str))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: i64,
    project_id: i64,
    ref_name: String,
    sha: String,
    before_sha: Option<String>,
    tag: bool,
    trigger_user_id: Option<i64>,
    status: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration: Option<i64>,
    cascade_pending: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        let status = PipelineStatus::parse(&row.status).unwrap_or_else(|| {
            tracing::warn!("Pipeline {} has unknown status {:?}", row.id, row.status);
            PipelineStatus::Pending
        });

        Pipeline {
            id: row.id,
            project_id: row.project_id,
            ref_name: row.ref_name,
            sha: row.sha,
            before_sha: row.before_sha,
            tag: row.tag,
            trigger_user_id: row.trigger_user_id,
            status,
            started_at: row.started_at,
            finished_at: row.finished_at,
            duration: row.duration,
            cascade_pending: row.cascade_pending,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
