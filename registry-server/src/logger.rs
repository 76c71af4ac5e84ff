//! Logging Infrastructure
//!
//! Console output plus, when a log directory is configured, three daily
//! rotating files split by tracing target:
//! - `app/`: everything except `audit` and `security` (pruned after 14 days)
//! - `audit/`: bulk uploads, replace-all phases, deletes (kept)
//! - `security/`: authentication failures (kept)

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::filter_fn, fmt, prelude::*};

const APP_LOG_RETENTION_DAYS: i64 = 14;

type Base = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

/// Delete `app-YYYY-MM-DD*` files older than the retention window
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);

    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // RollingFileAppender names files `app.YYYY-MM-DD`
        if let Some(date_part) = name.strip_prefix("app.")
            && let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }
    Ok(())
}

fn file_layer(dir: &Path, prefix: &'static str, json: bool) -> anyhow::Result<BoxedLayer> {
    let dir = dir.join(prefix);
    fs::create_dir_all(&dir)?;
    let writer = std::sync::Mutex::new(RollingFileAppender::new(Rotation::DAILY, dir, prefix));

    let target_filter = filter_fn(move |meta| match prefix {
        "audit" | "security" => meta.target() == prefix,
        _ => meta.target() != "audit" && meta.target() != "security",
    });

    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(writer);

    Ok(if json {
        layer.json().with_current_span(true).with_filter(target_filter).boxed()
    } else {
        layer.with_filter(target_filter).boxed()
    })
}

/// Initialize the logging system
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console: BoxedLayer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };
    let mut layers = vec![console];

    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);
        fs::create_dir_all(log_dir)?;
        for prefix in ["app", "audit", "security"] {
            layers.push(file_layer(log_dir, prefix, json_format)?);
        }
        tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;
    Ok(())
}

/// Hourly cleanup of old application logs
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_removes_only_expired_app_logs() {
        let root = std::env::temp_dir().join(format!("registry-logs-{}", uuid::Uuid::new_v4()));
        let app = root.join("app");
        fs::create_dir_all(&app).unwrap();
        let old = app.join("app.2000-01-01");
        let today = app.join(format!("app.{}", chrono::Local::now().format("%Y-%m-%d")));
        fs::write(&old, "x").unwrap();
        fs::write(&today, "x").unwrap();

        cleanup_old_logs(&root).unwrap();
        assert!(!old.exists());
        assert!(today.exists());
        fs::remove_dir_all(&root).unwrap();
    }
}
