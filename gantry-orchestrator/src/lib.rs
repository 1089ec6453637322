//! Gantry Orchestrator
//!
//! Tracks pipelines and derives each pipeline's verdict from the
//! out-of-order completion reports of its builds.
//!
//! Architecture:
//! - Repository: the `Store` interface with Postgres and in-memory backends
//! - Service: registry, aggregator, transitions, cancellation and retry
//! - Collaborators: notifier, dispatcher, authorizer and clock interfaces
//! - API: HTTP boundary over the services

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod notify;
pub mod repository;
pub mod service;
