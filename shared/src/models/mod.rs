//! Data models
//!
//! Shared between registry-server and its API clients.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY).

pub mod air_permit;
pub mod business;
pub mod invoice;
pub mod snapshot;
pub mod sync;

// Re-exports
pub use air_permit::*;
pub use business::*;
pub use invoice::*;
pub use snapshot::*;
pub use sync::*;
