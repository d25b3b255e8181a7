//! Logging setup for applications embedding the dispatch core.
//!
//! The core itself emits `tracing` events; this module provides a small
//! configuration surface over `tracing-subscriber` for binaries that do
//! not install their own subscriber.
//!
//! ```no_run
//! use gantry_core::logging::{LogConfig, LogFormat, LogLevel};
//!
//! LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init();
//! ```

use tracing_subscriber::EnvFilter;

// Re-export the macros the rest of the crate logs with.
pub use tracing::{debug, error, info, trace, warn};

/// Log level for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The directive string understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

/// Subscriber configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    level: LogLevel,
    format: LogFormat,
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::default(),
        }
    }

    /// Set the default log level.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Install the global subscriber. Returns false when one is already
    /// installed, which is not an error.
    pub fn init(self) -> bool {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        match self.format {
            LogFormat::Pretty => builder.pretty().try_init().is_ok(),
            LogFormat::Compact => builder.compact().try_init().is_ok(),
            LogFormat::Json => builder.json().try_init().is_ok(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new().level(LogLevel::Debug).format(LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_level_directives() {
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::Trace.as_str(), "trace");
    }
}
