//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod build;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod user;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::auth::Authorizer;
use crate::service::PipelineService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PipelineService>,
    pub authorizer: Arc<dyn Authorizer>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route(
            "/project/{project_id}/pipeline/{id}",
            get(pipeline::get_pipeline),
        )
        .route(
            "/project/{project_id}/pipeline/{id}/cancel",
            post(pipeline::cancel_pipeline),
        )
        .route(
            "/project/{project_id}/pipeline/{id}/retry",
            post(pipeline::retry_pipeline),
        )
        // Build endpoints
        .route("/build/{id}/report", post(build::report_build))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
