//! Build API Handlers
//!
//! Workers report build completion here.

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::build::BuildReport;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /build/{id}/report
/// Record a build status and return the owning pipeline as it now stands
pub async fn report_build(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(report): Json<BuildReport>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Build {} reported {}", id, report.status);

    let transition = state.service.report_build(id, report.status).await?;
    Ok(Json(transition.into_pipeline()))
}
