//! Boundary lookups combining existence and authorization

use gantry_core::domain::pipeline::Pipeline;

use super::pipeline::PipelineService;
use super::{PipelineError, Result};
use crate::auth::Authorizer;

/// Result of looking something up on behalf of a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Forbidden,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::Forbidden => None,
        }
    }
}

/// What the caller intends to do with the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Manage,
}

/// Look up a pipeline of `project_id` for `user_id`
///
/// Users who cannot see the project get `NotFound`, so pipeline ids do not
/// leak; users who can see it but not manage it get `Forbidden` for
/// `Access::Manage`.
pub async fn find_pipeline(
    service: &PipelineService,
    authorizer: &dyn Authorizer,
    project_id: i64,
    pipeline_id: i64,
    user_id: i64,
    access: Access,
) -> Result<Lookup<Pipeline>> {
    let pipeline = match service.get_pipeline(pipeline_id).await? {
        Some(pipeline) if pipeline.project_id == project_id => pipeline,
        _ => return Ok(Lookup::NotFound),
    };

    let can_access = authorizer
        .can_access(project_id, user_id)
        .await
        .map_err(|err| PipelineError::unavailable("authorizer", err))?;
    if !can_access {
        return Ok(Lookup::NotFound);
    }

    if access == Access::Manage {
        let can_manage = authorizer
            .can_manage(project_id, user_id)
            .await
            .map_err(|err| PipelineError::unavailable("authorizer", err))?;
        if !can_manage {
            tracing::debug!(project_id, pipeline_id, user_id, "Manage access denied");
            return Ok(Lookup::Forbidden);
        }
    }

    Ok(Lookup::Found(pipeline))
}
