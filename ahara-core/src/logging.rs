//! Logging configuration with rotation support
//!
//! # Example
//!
//! ```rust,no_run
//! use ahara_core::logging::init_logging;
//!
//! init_logging("logs", "ahara.log", "info").unwrap();
//! ```

use crate::error::{Error, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging to stdout and a daily rolling file
///
/// - `directory`: Directory to store logs
/// - `filename_prefix`: Prefix for log files (e.g. "ahara.log")
/// - `level`: Default log level (e.g. "info", "ahara_kb=debug")
pub fn init_logging(directory: &str, filename_prefix: &str, level: &str) -> Result<()> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(filename_prefix)
        .build(directory)
        .map_err(|e| Error::Internal(format!("Failed to create log appender: {}", e)))?;

    // Stdout for humans, file without ANSI for grepping
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to init tracing: {}", e)))
}

/// Initialize stdout-only logging, for tools and tests
pub fn init_stdout_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to init tracing: {}", e)))
}
