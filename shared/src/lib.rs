//! Shared types for the business registry service
//!
//! Error system, API envelope, domain models and small time helpers used
//! by the server crate and its integration tests.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
