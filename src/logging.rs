//! Tracing subscriber setup
//!
//! Logs go to stderr so that stdout only carries dashboard output. An
//! optional directory adds a daily-rotated log file next to it.

use std::path::Path;

use clap::ValueEnum;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::AppError;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Installs the global subscriber
///
/// # Arguments
/// * `level` - Filter directives, e.g. `info` or `findash=debug,reqwest=warn`
/// * `format` - Format of the stderr output
/// * `log_dir` - Directory for a daily-rotated `findash.*.log` file, if any
///
/// # Returns
/// * `Ok(Some(guard))` when a log file is written; keep the guard alive until exit
/// * `Ok(None)` when only stderr is used
pub fn init(
    level: &str,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>, AppError> {
    let env_filter = EnvFilter::builder()
        .parse(level)
        .map_err(|err| AppError::Logging(format!("invalid log level '{level}': {err}")))?;

    let stderr_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("findash")
                .filename_suffix("log")
                .build(dir)
                .map_err(|err| {
                    AppError::Logging(format!("cannot log to {}: {err}", dir.display()))
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|err| AppError::Logging(err.to_string()))?;

    Ok(guard)
}

/// Logs the effective configuration once at startup
pub fn log_startup(config: &Config, store: &CacheStore) {
    info!(
        mode = ?config.mode,
        cache_dir = %store.dir().display(),
        cache_files = store.len(),
        ttl_minutes = config.cache_ttl.num_minutes(),
        max_age_hours = config.cache_max_age.num_hours(),
        max_retries = config.retry.max_retries,
        refresh_interval_secs = config.refresh_interval.as_secs(),
        api_keys = ?config.api_keys,
        tickers = ?config.symbols(),
        "findash starting"
    );
}
