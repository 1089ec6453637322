//! Write validation shared by every store implementation

use gantry_core::domain::build::BuildStatus;
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::build::NewBuild;
use gantry_core::dto::pipeline::{NewPipeline, PipelineChanges};
use serde::Serialize;

/// A single rejected field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// All field errors of a rejected write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|e| e.field)
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{} {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

const MAX_SHA_LEN: usize = 40;
const MAX_REF_LEN: usize = 255;

fn check_sha(errors: &mut ValidationErrors, field: &'static str, sha: &str) {
    if sha.is_empty() {
        errors.add(field, "can't be blank");
    } else if sha.len() > MAX_SHA_LEN {
        errors.add(field, format!("is too long (max {} characters)", MAX_SHA_LEN));
    } else if !sha.chars().all(|c| c.is_ascii_hexdigit()) {
        errors.add(field, "must be hexadecimal");
    }
}

pub fn validate_new_pipeline(new: &NewPipeline) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    check_sha(&mut errors, "sha", &new.sha);
    if let Some(before) = &new.before_sha {
        check_sha(&mut errors, "before_sha", before);
    }

    if new.ref_name.trim().is_empty() {
        errors.add("ref_name", "can't be blank");
    } else if new.ref_name.len() > MAX_REF_LEN {
        errors.add(
            "ref_name",
            format!("is too long (max {} characters)", MAX_REF_LEN),
        );
    }

    errors.into_result()
}

/// Validate `changes` as they would apply on top of `current`
pub fn validate_changes(current: &Pipeline, changes: &PipelineChanges) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Some(duration) = changes.duration {
        if duration < 0 {
            errors.add("duration", "must be greater than or equal to 0");
        }
    }

    let started_at = changes.started_at.or(current.started_at);
    let finished_at = changes.finished_at.or(current.finished_at);
    if let (Some(started), Some(finished)) = (started_at, finished_at) {
        if finished < started {
            errors.add("finished_at", "must not be before started_at");
        }
    }

    errors.into_result()
}

pub fn validate_new_build(new: &NewBuild) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if new.name.trim().is_empty() {
        errors.add("name", "can't be blank");
    } else if new.name.len() > MAX_REF_LEN {
        errors.add("name", format!("is too long (max {} characters)", MAX_REF_LEN));
    }

    errors.into_result()
}

/// Workers may only report statuses a build can reach on its own
pub fn validate_report(status: BuildStatus) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if !status.is_reportable() {
        errors.add("status", format!("{} cannot be reported by a worker", status));
    }

    errors.into_result()
}
