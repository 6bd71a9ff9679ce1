//! Logging infrastructure for medview.
//!
//! Every run appends to `medview.log` in the platform cache directory
//! (`~/.cache/medview/` on Linux) or in `MEDVIEW_LOG_DIR`. The filter comes
//! from `MEDVIEW_LOG` (default: `info`).
//!
//! # Example
//!
//! ```bash
//! # Normal operation (info level)
//! medview classify data/
//!
//! # See every reconciliation decision
//! MEDVIEW_LOG=debug medview reconcile data/ --scene remote.json
//!
//! # Follow the log of a running session
//! tail -f ~/.cache/medview/medview.log
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::{self, format::FmtSpan}, prelude::*, EnvFilter};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "MEDVIEW_LOG";

/// Overrides the directory the log file is written to.
pub const LOG_DIR_ENV: &str = "MEDVIEW_LOG_DIR";

const LOG_FILE: &str = "medview.log";

/// Directory holding `medview.log`: `MEDVIEW_LOG_DIR`, else the platform cache dir.
pub fn log_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    directories::ProjectDirs::from("", "", "medview").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Get the path to the log file.
pub fn log_file_path() -> Option<PathBuf> {
    log_dir().map(|dir| dir.join(LOG_FILE))
}

/// Initialize the logging system.
///
/// Logs always go to the log file. They are mirrored to stderr when
/// MEDVIEW_LOG is set or `verbose` is true; `verbose` alone raises the
/// default level to `debug`. Hold the returned guard for the lifetime of
/// the program so buffered lines get flushed.
pub fn init_logging(verbose: bool) -> Result<WorkerGuard> {
    let dir = log_dir().context("Failed to determine log directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let log_file = dir.join(LOG_FILE);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to open log file: {}", log_file.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let log_env = std::env::var(LOG_ENV).ok();
    let to_stderr = verbose || log_env.is_some();
    let filter = log_env.unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());

    // Span close events carry load and upload durations.
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let stderr_layer = to_stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(EnvFilter::new(&filter))
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to set global tracing subscriber")?;

    Ok(guard)
}
