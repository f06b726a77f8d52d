//! REST API Server Module
//!
//! This module provides the REST API of the swap verifier service: service
//! health with per-chain stream statistics, the latest drained bridge events,
//! and swap validation returning a threshold signature.

// Generic shared code
pub mod generic;

// Swap endpoints
pub mod swap;

pub use generic::{ApiResponse, ApiServer, HealthStatus};
