//! registry-server: business registry sync engine and invoice-stage ledger
//!
//! - Bulk uploads with overwrite/merge/skip conflict policies, batched
//!   under the SQLite parameter budget
//! - Guarded replace-all with a pre-flight snapshot and air permit
//!   tree reattachment
//! - Per-stage invoice ledger with revision chains and receivables

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logger;
pub mod registry;
pub mod state;
pub mod sync;

pub use config::Config;
pub use state::AppState;
