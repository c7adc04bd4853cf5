//! Tracing setup for hosts embedding the synthesis core.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! the embedding process's decision. [`try_init_tracing`] wires the default
//! the rest of the crate assumes: a compact stdout layer filtered by
//! `RUST_LOG` (falling back to `stakesum=info`), plus an append-mode file
//! layer when `SUMMARY_LOG_FILE` names a writable path. The file writer is
//! non-blocking; the returned guard must stay alive for the process lifetime
//! or buffered events are dropped on exit.

use std::fs::{File, OpenOptions};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable naming the optional log file.
pub const LOG_FILE_ENV: &str = "SUMMARY_LOG_FILE";

const DEFAULT_FILTER: &str = "stakesum=info";

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The host process already installed a global subscriber.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    /// The configured log file could not be opened for appending.
    #[error("failed to open log file '{path}': {source}")]
    LogFile {
        /// Path taken from `SUMMARY_LOG_FILE`.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

/// Install the crate's default tracing subscriber.
///
/// Returns the file writer's guard when file logging is active; the caller
/// holds it for the process lifetime. Fails with
/// [`LoggingError::AlreadyInitialized`] when a subscriber is already in
/// place, so embedders that configure their own tracing are never clobbered.
pub fn try_init_tracing() -> Result<Option<WorkerGuard>, LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer);

    match log_file_from_env()? {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact();
            registry
                .with(file_layer)
                .try_init()
                .map_err(|_| LoggingError::AlreadyInitialized)?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|_| LoggingError::AlreadyInitialized)?;
            Ok(None)
        }
    }
}

fn log_file_from_env() -> Result<Option<File>, LoggingError> {
    match std::env::var(LOG_FILE_ENV) {
        Ok(path) if !path.trim().is_empty() => open_log_file(&path).map(Some),
        _ => Ok(None),
    }
}

fn open_log_file(path: &str) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::LogFile {
            path: path.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritable_log_path_is_reported() {
        let error = open_log_file("/nonexistent-dir/stakesum.log").unwrap_err();
        assert!(matches!(error, LoggingError::LogFile { .. }));
    }

    #[test]
    fn repeated_initialization_is_rejected() {
        let _guard = try_init_tracing().expect("first initialization");
        let error = try_init_tracing().expect_err("second initialization");
        assert!(matches!(error, LoggingError::AlreadyInitialized));
    }
}
