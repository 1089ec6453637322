//! Build domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One job within a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: i64,
    pub pipeline_id: i64,
    pub name: String,
    pub stage: Option<String>,
    pub status: BuildStatus,
    /// A failed build with this flag set does not fail its pipeline
    pub allow_failure: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Build {
    /// Failed, and allowed to be
    pub fn is_allowed_failure(&self) -> bool {
        self.status == BuildStatus::Failed && self.allow_failure
    }
}

/// Build execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl BuildStatus {
    /// Statuses considered when looking for a pipeline's most recent build
    pub const REPORTABLE: [BuildStatus; 5] = [
        BuildStatus::Pending,
        BuildStatus::Running,
        BuildStatus::Success,
        BuildStatus::Failed,
        BuildStatus::Skipped,
    ];

    pub fn is_terminal(self) -> bool {
        !matches!(self, BuildStatus::Pending | BuildStatus::Running)
    }

    pub fn is_reportable(self) -> bool {
        self != BuildStatus::Cancelled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Skipped => "skipped",
            BuildStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BuildStatus::Pending),
            "running" => Some(BuildStatus::Running),
            "success" => Some(BuildStatus::Success),
            "failed" => Some(BuildStatus::Failed),
            "skipped" => Some(BuildStatus::Skipped),
            "cancelled" => Some(BuildStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
