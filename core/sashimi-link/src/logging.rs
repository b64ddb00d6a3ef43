//! File logging for sashimi-link.
//!
//! The link runs as a URL handler with no terminal, so everything goes to
//! `~/.sashimi/logs/sashimi-link.log`. Logging is best-effort: if the
//! directory can't be created we run without a subscriber.

use fs_err as fs;
use sashimi_core::StorageConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "sashimi-link.log";

pub fn init() -> Option<WorkerGuard> {
    let storage = StorageConfig::from_home().ok()?;
    let logs_dir = storage.logs_dir();
    fs::create_dir_all(&logs_dir).ok()?;

    let appender = tracing_appender::rolling::never(&logs_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let debug_enabled = std::env::var("SASHIMI_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;

    Some(guard)
}
