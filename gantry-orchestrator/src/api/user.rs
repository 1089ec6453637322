//! Caller identity
//!
//! Authentication happens in front of the orchestrator, which only reads the
//! resulting user id from a request header.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::error::ApiError;

pub const USER_HEADER: &str = "x-gantry-user";

/// The authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", USER_HEADER)))?;

        value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized(format!("invalid {} header", USER_HEADER)))
    }
}
