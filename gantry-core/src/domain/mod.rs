//! Core domain types
//!
//! This module contains the core domain structures used across Gantry services.
//! A pipeline is one CI run for a commit; it owns the builds (jobs) whose
//! independent results decide the pipeline's verdict.

pub mod build;
pub mod pipeline;
