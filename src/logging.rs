//! Terminal and file logging for the conditioning service.
//!
//! The sample path never logs; log traffic comes from setup, teardown, and
//! the diagnostics worker, and goes through non-blocking writers so a slow
//! terminal or disk cannot stall anything upstream.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logger thread handles, which must be kept alive for as long as the
/// logging targets will be used. Flushed automatically when dropped.
static LOGGING_GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Set up terminal and file logging, creating `<log_dir>/<name>.log`.
/// Returns the log file path. Errors if logging was already initialized.
pub fn init_logging(log_dir: &Path, name: &str) -> Result<PathBuf, String> {
    if LOGGING_GUARDS.get().is_some() {
        return Err("Logging already initialized".to_string());
    }

    fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log directory: {e}"))?;
    let log_path = log_dir.join(format!("{name}.log"));
    let logfile = OpenOptions::new()
        .create(true)
        .truncate(false)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {e}"))?;

    // Build terminal and file writers
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file_writer, file_guard) = tracing_appender::non_blocking(logfile);

    // Filter for log level
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| format!("Failed to set up logging env filter: {e}"))?;

    let stdout_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(stdout_writer)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(file_writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {e}"))?;

    let _ = LOGGING_GUARDS.set((stdout_guard, file_guard));

    Ok(log_path)
}
