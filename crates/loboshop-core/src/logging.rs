//! Tracing setup for binaries.
//!
//! Logs go to a daily-rolling file under `${LOBOSHOP_HOME}/logs` so that
//! stdout and stderr stay owned by the front end.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "LOBOSHOP_LOG";

const DEFAULT_FILTER: &str = "warn";
const LOG_FILE_PREFIX: &str = "loboshop.log";

/// Installs the global subscriber.
///
/// The returned guard flushes buffered lines on drop; keep it alive for
/// the lifetime of the process.
///
/// # Errors
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(logs_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
