//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services decide and apply pipeline state changes on top of the store.

pub mod access;
pub mod aggregator;
pub mod cancel;
pub mod duplicate;
pub mod locks;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod transition;

// Re-export for convenience
pub use access::{Access, Lookup};
pub use aggregator::Verdict;
pub use cancel::{BuildCanceller, CancellationCoordinator, StoreBuildCanceller};
pub use duplicate::DuplicationService;
pub use pipeline::{Collaborators, PipelineService};
pub use registry::{BuildStatusRegistry, RegistrySnapshot};
pub use transition::{Transition, TransitionController};

use gantry_core::domain::pipeline::Pipeline;
use thiserror::Error;

use crate::repository::{StoreError, ValidationErrors};

/// A build the cancellation cascade could not stop
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BuildCancelFailure {
    pub build_id: i64,
    pub reason: String,
}

/// Service error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A store write was rejected
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The pipeline is cancelled but some of its builds are still active
    #[error(
        "pipeline {} cancelled but {} build(s) could not be cancelled",
        .pipeline.id,
        .failed_builds.len()
    )]
    PartialCascadeFailure {
        pipeline: Box<Pipeline>,
        failed_builds: Vec<BuildCancelFailure>,
    },

    /// A collaborator failed after the pipeline change was committed
    #[error("{service} failed after pipeline {} was updated: {source}", .pipeline.id)]
    ExternalDependency {
        service: &'static str,
        pipeline: Box<Pipeline>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A collaborator failed before anything was changed
    #[error("{service} unavailable: {source}")]
    Unavailable {
        service: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl PipelineError {
    pub(crate) fn external(service: &'static str, pipeline: &Pipeline, err: anyhow::Error) -> Self {
        PipelineError::ExternalDependency {
            service,
            pipeline: Box::new(pipeline.clone()),
            source: err.into(),
        }
    }

    pub(crate) fn unavailable(service: &'static str, err: anyhow::Error) -> Self {
        PipelineError::Unavailable {
            service,
            source: err.into(),
        }
    }

    /// The committed pipeline carried by partial-success errors
    pub fn committed_pipeline(&self) -> Option<&Pipeline> {
        match self {
            PipelineError::PartialCascadeFailure { pipeline, .. }
            | PipelineError::ExternalDependency { pipeline, .. } => Some(&**pipeline),
            _ => None,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(errors) => PipelineError::Validation(errors),
            StoreError::NotFound { entity, id } => PipelineError::NotFound { entity, id },
            other => PipelineError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
