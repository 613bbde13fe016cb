//! # System Module
//!
//! Repository metrics.

mod metrics;

pub use metrics::*;
