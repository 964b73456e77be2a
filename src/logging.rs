//! Logging and observability setup
//!
//! Provides structured logging with:
//! - Console output in pretty or JSON format
//! - An optional log file with a non-blocking writer
//! - Level control via configuration or `RUST_LOG`-style directives

use anyhow::{Context, Result};
use std::{ffi::OsStr, io, path::Path};
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;
use crate::error::VscanError;

/// Initialize the logging system with default configuration.
pub fn init_logging() -> Result<Option<WorkerGuard>> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with specific configuration.
///
/// Returns the worker guard of the file writer when a log file is
/// configured; dropping it flushes and stops the writer.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = create_env_filter(&config.level)?;

    let (file_layer, guard) = match &config.file_path {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| OsStr::new("vscan.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = match config.format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed(),
        _ => fmt::layer()
            .pretty()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging system initialized with level: {}", config.level);
    Ok(guard)
}

/// Create environment filter from log level string
fn create_env_filter(level: &str) -> Result<EnvFilter> {
    let base_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => return Err(VscanError::config(format!("Invalid log level: {}", level)).into()),
    };

    let filter = EnvFilter::builder()
        .with_default_directive(base_level.into())
        .from_env()
        .context("Failed to create environment filter")?
        .add_directive("rustls=info".parse()?)
        .add_directive("tokio=info".parse()?);

    Ok(filter)
}
