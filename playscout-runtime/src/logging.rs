//! Structured logging init.
//!
//! Export/formatting of logs to an external collector is out of scope here;
//! this just wires `tracing-subscriber` so the `tracing::{info,warn,error}!`
//! calls sprinkled through the other crates land somewhere readable.

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            default_filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// Installs the global `tracing` subscriber. Must be called at most once per
/// process; a second call returns [`Error::LoggingAlreadyInitialized`].
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter.clone()));

    let result = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
    };

    result.map_err(|_| Error::LoggingAlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_info_filter() {
        let config = LoggingConfig::default();
        assert_eq!(config.default_filter, "info");
    }
}
