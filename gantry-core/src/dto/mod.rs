//! Data Transfer Objects
//!
//! Write requests handed to the store and payloads exchanged with the
//! orchestrator's HTTP boundary.

pub mod build;
pub mod pipeline;
