//! # Observability
//!
//! Centralized logging setup for Tollgate binaries.
//!
//! Binaries call `observability::init()` once at startup and use standard
//! `tracing` macros everywhere else. Library code never installs a
//! subscriber.
//!
//! ## Outputs
//!
//! - Default: compact human-readable lines on stderr.
//! - With `log_path`: structured JSONL appended to that file, optionally
//!   mirrored to stderr. Field names that look like credentials (`token`,
//!   `secret`, `password`, `authorization`) are written as `[REDACTED]`.
//!
//! `RUST_LOG` overrides `default_level` in both modes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("tollgate");
//!
//!     tracing::info!("ready");
//! }
//! ```
//!
//! Or with configuration:
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "tollgate".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/var/log/tollgate.jsonl".into()),
//!     also_stderr: true,
//! });
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;
use tracing_subscriber::util::SubscriberInitExt;

pub use file::{default_log_path, LogFileWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Write JSONL to this file instead of plain stderr output.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr when writing to a file.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings.
///
/// ```rust,ignore
/// fn main() {
///     observability::init("my-service");
///     tracing::info!("ready");
/// }
/// ```
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place. If the log file cannot be opened, logging falls
/// back to stderr and the failure is reported there.
pub fn init_with_config(config: LogConfig) {
    if let Some(path) = config.log_path.clone() {
        match file::try_init_file_subscriber(&config, &path) {
            Ok(()) => return,
            Err(file::FileInitError::Install(_)) => return,
            Err(file::FileInitError::Open { path, source }) => {
                init_stderr(&config);
                tracing::warn!(
                    log_path = %path.display(),
                    error = %source,
                    "Unable to open log file, logging to stderr"
                );
                return;
            }
        }
    }

    init_stderr(&config);
}

fn init_stderr(config: &LogConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish()
        .try_init();
}

/// Re-export tracing macros for convenience.
/// Services can use `observability::info!()` or `tracing::info!()`.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
