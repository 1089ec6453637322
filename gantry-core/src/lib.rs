//! Gantry Core
//!
//! Core types and abstractions for the Gantry CI orchestrator.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, Build)
//! - DTOs: Data transfer objects exchanged with the orchestrator boundary

pub mod domain;
pub mod dto;
