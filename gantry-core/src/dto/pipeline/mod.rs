//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::PipelineStatus;

/// Fields of a pipeline about to be inserted
///
/// Identity, timestamps and status are assigned by the store; a new
/// pipeline always starts `pending` with no builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPipeline {
    pub project_id: i64,
    pub ref_name: String,
    pub sha: String,
    pub before_sha: Option<String>,
    #[serde(default)]
    pub tag: bool,
    pub trigger_user_id: Option<i64>,
}

/// Partial update of a pipeline
///
/// Only `Some` fields are written. When `expected_status` is set the write
/// only applies if the stored status still matches it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineChanges {
    pub expected_status: Option<PipelineStatus>,
    pub status: Option<PipelineStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub cascade_pending: Option<bool>,
}

impl PipelineChanges {
    /// Guard the write on the status the caller last observed
    pub fn expecting(status: PipelineStatus) -> Self {
        Self {
            expected_status: Some(status),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: PipelineStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn finished(mut self, at: DateTime<Utc>, duration: i64) -> Self {
        self.finished_at = Some(at);
        self.duration = Some(duration);
        self
    }

    pub fn cascade_pending(mut self, pending: bool) -> Self {
        self.cascade_pending = Some(pending);
        self
    }
}
