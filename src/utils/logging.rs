//! Logging.
//!
//! Two layers live here:
//!
//! - [`init_logging`] installs the process-wide `tracing` subscriber from a
//!   [`LoggingConfig`] (console and/or file, plain or JSON, `RUST_LOG` aware).
//! - [`LogSink`] is the logging service handed to server and client sessions at
//!   construction. Session-level events (admissions, dropped frames, unknown
//!   message types) go through it, so tests can swap in a [`CapturingSink`]
//!   instead of relying on global state.

use std::fs::File;
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.log_level` when set.
///
/// # Errors
/// Returns `ConfigError` if the log file cannot be created or a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.log_to_console {
        let layer = fmt::layer().with_target(true).with_level(true);
        layers.push(if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_file_path must be set for file logging".into())
        })?;
        let file = File::create(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to create log file: {e}")))?;
        let layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true);
        layers.push(if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    tracing::info!(app = %config.app_name, "Logging initialized");
    Ok(())
}

/// The logging service consumed by sessions
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, category: &str, message: &str, source: &str);
}

/// Forwards to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, category: &str, message: &str, source: &str) {
        match level {
            Level::ERROR => tracing::error!(category, source, "{message}"),
            Level::WARN => tracing::warn!(category, source, "{message}"),
            Level::INFO => tracing::info!(category, source, "{message}"),
            Level::DEBUG => tracing::debug!(category, source, "{message}"),
            Level::TRACE => tracing::trace!(category, source, "{message}"),
        }
    }
}

/// One captured log call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub category: String,
    pub message: String,
    pub source: String,
}

/// Records every call in memory, for assertions in tests
#[derive(Debug, Default)]
pub struct CapturingSink {
    records: Mutex<Vec<LogRecord>>,
}

impl CapturingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether any record at `level` contains `needle` in its message
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|record| record.level == level && record.message.contains(needle))
    }
}

impl LogSink for CapturingSink {
    fn log(&self, level: Level, category: &str, message: &str, source: &str) {
        let record = LogRecord {
            level,
            category: category.to_string(),
            message: message.to_string(),
            source: source.to_string(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
