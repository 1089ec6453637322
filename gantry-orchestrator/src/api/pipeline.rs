//! Pipeline API Handlers
//!
//! HTTP endpoints for reading, cancelling and retrying pipelines.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use gantry_core::domain::pipeline::Pipeline;
use serde::Serialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::user::CurrentUser;
use crate::service::access::find_pipeline;
use crate::service::{Access, BuildCancelFailure, Lookup, PipelineError};

/// Body of a cancel response
#[derive(Debug, Serialize)]
pub struct CancelOutcome {
    pub pipeline: Pipeline,
    /// Builds still active after the cascade; empty on full success
    pub uncancelled_builds: Vec<BuildCancelFailure>,
}

async fn authorized(
    state: &AppState,
    project_id: i64,
    id: i64,
    user: CurrentUser,
    access: Access,
) -> ApiResult<Pipeline> {
    let lookup = find_pipeline(
        &state.service,
        state.authorizer.as_ref(),
        project_id,
        id,
        user.0,
        access,
    )
    .await?;

    match lookup {
        Lookup::Found(pipeline) => Ok(pipeline),
        Lookup::NotFound => Err(ApiError::NotFound(format!("pipeline {} not found", id))),
        Lookup::Forbidden => Err(ApiError::Forbidden(format!(
            "not allowed to manage pipeline {}",
            id
        ))),
    }
}

/// GET /project/{project_id}/pipeline/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(i64, i64)>,
    user: CurrentUser,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = authorized(&state, project_id, id, user, Access::Read).await?;
    Ok(Json(pipeline))
}

/// POST /project/{project_id}/pipeline/{id}/cancel
///
/// Answers 202 when the pipeline is cancelled but some builds could not be
/// stopped yet; the reconciler keeps retrying those.
pub async fn cancel_pipeline(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(i64, i64)>,
    user: CurrentUser,
) -> ApiResult<(StatusCode, Json<CancelOutcome>)> {
    authorized(&state, project_id, id, user, Access::Manage).await?;
    tracing::info!(pipeline_id = id, user_id = user.0, "Cancelling pipeline");

    match state.service.cancel(id).await {
        Ok(transition) => Ok((
            StatusCode::OK,
            Json(CancelOutcome {
                pipeline: transition.into_pipeline(),
                uncancelled_builds: Vec::new(),
            }),
        )),
        Err(PipelineError::PartialCascadeFailure {
            pipeline,
            failed_builds,
        }) => Ok((
            StatusCode::ACCEPTED,
            Json(CancelOutcome {
                pipeline: *pipeline,
                uncancelled_builds: failed_builds,
            }),
        )),
        Err(err) => Err(err.into()),
    }
}

/// POST /project/{project_id}/pipeline/{id}/retry
pub async fn retry_pipeline(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(i64, i64)>,
    user: CurrentUser,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    authorized(&state, project_id, id, user, Access::Manage).await?;
    tracing::info!(pipeline_id = id, user_id = user.0, "Retrying pipeline");

    let pipeline = state.service.duplicate(id).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}
