//! Registry server configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Registry server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file
    pub database_path: String,
    /// HTTP listen port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// HS256 secret shared with the external auth layer
    pub jwt_secret: String,
    /// Rows per batch for incremental uploads (further capped by the parameter budget)
    pub batch_size: usize,
    /// Rows per batch for replace-all reinsertion
    pub replace_batch_size: usize,
    /// Seconds after which a held registry lock may be taken over
    pub migration_lock_ttl_secs: u64,
    pub log_level: String,
    pub log_json: bool,
    /// Optional directory for rotating log files
    pub log_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "registry.db".into(),
            http_port: 8080,
            environment: "development".into(),
            jwt_secret: "dev-JWT_SECRET-not-for-production".into(),
            batch_size: 500,
            replace_batch_size: 200,
            migration_lock_ttl_secs: 1800,
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
        }
    }
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let defaults = Self::default();
        let environment = std::env::var("ENVIRONMENT").unwrap_or(defaults.environment);

        let batch_size: usize = Self::parse_var("BATCH_SIZE", defaults.batch_size);
        let replace_batch_size: usize =
            Self::parse_var("REPLACE_BATCH_SIZE", defaults.replace_batch_size);
        if batch_size == 0 || replace_batch_size == 0 {
            return Err("BATCH_SIZE and REPLACE_BATCH_SIZE must be positive".into());
        }

        Ok(Self {
            database_path: std::env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            http_port: Self::parse_var("HTTP_PORT", defaults.http_port),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            environment,
            batch_size,
            replace_batch_size,
            migration_lock_ttl_secs: Self::parse_var(
                "MIGRATION_LOCK_TTL_SECS",
                defaults.migration_lock_ttl_secs,
            ),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: Self::parse_var("LOG_JSON", defaults.log_json),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
        })
    }
}
