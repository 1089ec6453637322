//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gantry_core::domain::pipeline::Pipeline;

use crate::repository::ValidationErrors;
use crate::service::PipelineError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Validation(ValidationErrors),
    Unauthorized(String),
    Forbidden(String),
    /// A downstream service failed after the pipeline was already changed
    BadGateway {
        message: String,
        pipeline: Box<Pipeline>,
    },
    Unavailable(String),
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg) => serde_json::json!({ "error": msg }),
            ApiError::Validation(errors) => serde_json::json!({
                "error": "validation failed",
                "details": errors,
            }),
            ApiError::BadGateway { message, pipeline } => {
                tracing::warn!(pipeline_id = pipeline.id, "Downstream failure: {}", message);
                serde_json::json!({ "error": message, "pipeline": pipeline })
            }
            ApiError::Unavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                serde_json::json!({ "error": msg })
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                serde_json::json!({ "error": "Internal server error" })
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(errors) => ApiError::Validation(errors),
            PipelineError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} {} not found", entity, id))
            }
            PipelineError::ExternalDependency { ref pipeline, .. } => ApiError::BadGateway {
                pipeline: pipeline.clone(),
                message: err.to_string(),
            },
            PipelineError::Unavailable { .. } => ApiError::Unavailable(err.to_string()),
            // Handlers that can partially succeed deal with this themselves
            PipelineError::PartialCascadeFailure { .. } | PipelineError::Store(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::StoreError;

    #[test]
    fn test_pipeline_error_status_codes() {
        let not_found: ApiError = PipelineError::NotFound {
            entity: "build",
            id: 3,
        }
        .into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let unavailable: ApiError =
            PipelineError::unavailable("authorizer", anyhow::anyhow!("timeout")).into();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let conflict: ApiError = PipelineError::Store(StoreError::Conflict {
            id: 1,
            expected: gantry_core::domain::pipeline::PipelineStatus::Running,
            actual: gantry_core::domain::pipeline::PipelineStatus::Failed,
        })
        .into();
        assert_eq!(conflict.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_response() {
        let response = ApiError::Validation(ValidationErrors::default()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
