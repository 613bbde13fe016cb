//! # cohort
//!
//! Library half of the Cohort server binary: configuration, store opening,
//! the HTTP API and the CLI. Split out so integration tests can drive the
//! router directly.

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod node;
