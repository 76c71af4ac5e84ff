//! Application state for the registry server

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::DbService;
use crate::error::BoxError;
use crate::sync::SyncSettings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool
    pub pool: SqlitePool,
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
    /// Batch sizes and lock TTL for bulk runs
    pub sync: SyncSettings,
}

impl AppState {
    /// Open the database (running migrations) and assemble the state
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let db = DbService::new(&config.database_path).await?;
        Ok(Self::from_pool(db.pool, config))
    }

    pub fn from_pool(pool: SqlitePool, config: &Config) -> Self {
        Self {
            pool,
            jwt_secret: config.jwt_secret.clone(),
            sync: SyncSettings::from_config(config),
        }
    }
}
