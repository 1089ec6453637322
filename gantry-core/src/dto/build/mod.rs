//! Build DTOs

use serde::{Deserialize, Serialize};

use crate::domain::build::BuildStatus;

/// Fields of a build about to be attached to a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBuild {
    pub pipeline_id: i64,
    pub name: String,
    pub stage: Option<String>,
    #[serde(default)]
    pub allow_failure: bool,
}

/// Completion report sent by a build worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub status: BuildStatus,
}
