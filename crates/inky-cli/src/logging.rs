//! Tracing subscriber setup.

use anyhow::{Context, Result};
use inky_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "INKY_LOG";

/// Keeps the file writer flushing; hold it until the process exits.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber: stderr always, plus `config.file` when set.
///
/// # Errors
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    let filter = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level '{}'", config.level))?,
    };
    let stderr = fmt::layer().with_writer(std::io::stderr);

    let Some(path) = config.file.as_deref() else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .try_init()
            .context("install log subscriber")?;
        return Ok(LogGuard { _file: None });
    };

    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("log file path has no file name: {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        directory, file_name,
    ));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("install log subscriber")?;
    Ok(LogGuard { _file: Some(guard) })
}
