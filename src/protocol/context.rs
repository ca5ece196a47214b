//! Explicit dependencies handed to sessions at construction.

use std::fmt;
use std::sync::Arc;

use tracing::Level;

use crate::config::{NetworkConfig, CLIENT_VERSION};
use crate::utils::logging::{LogSink, TracingSink};
use crate::utils::time::{Clock, SystemClock};

/// Logging service, version string and clock shared by a session and its connections
#[derive(Clone)]
pub struct SessionContext {
    logger: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    version: String,
}

impl SessionContext {
    pub fn new(logger: Arc<dyn LogSink>, version: impl Into<String>) -> Self {
        Self {
            logger,
            clock: Arc::new(SystemClock::new()),
            version: version.into(),
        }
    }

    /// Tracing-backed context announcing the configured client version
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(Arc::new(TracingSink), config.client.client_version.clone())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Version announced in `ClientConnect`
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn log(&self, level: Level, category: &str, message: &str, source: &str) {
        self.logger.log(level, category, message, source);
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink), CLIENT_VERSION)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
