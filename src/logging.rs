//! # Logging
//!
//! Installs the global `tracing` subscriber: console output always, plus a
//! daily-rolling file under `log_dir` when enabled. `RUST_LOG` overrides the
//! configured level.

use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{AgentError, Result};

/// Build the level filter, preferring `RUST_LOG` when it parses
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    EnvFilter::new(&config.level)
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer when dropped and must live as
/// long as the process logs.
///
/// # Errors
///
/// Returns `AgentError::Logging` if the log directory or appender cannot be
/// created, or a subscriber is already installed
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let (writer, guard) = if config.file_enabled {
        fs::create_dir_all(&config.log_dir)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&config.file_prefix)
            .build(&config.log_dir)
            .map_err(|e| AgentError::Logging(format!("cannot open log file in {}: {}", config.log_dir, e)))?;
        let (file, guard) = tracing_appender::non_blocking(appender);
        (BoxMakeWriter::new(std::io::stdout.and(file)), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stdout), None)
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(writer)
        .with_target(true)
        .with_ansi(guard.is_none())
        .finish()
        .try_init()
        .map_err(|e| AgentError::Logging(e.to_string()))?;

    Ok(guard)
}
