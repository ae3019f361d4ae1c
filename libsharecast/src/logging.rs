//! Logging setup shared by the Sharecast binaries
//!
//! All output goes to stderr so that stdout stays free for command output
//! (share results, connection listings). Format and level come from
//! `SHARECAST_LOG_FORMAT` / `SHARECAST_LOG_LEVEL` unless a binary passes
//! explicit values; `RUST_LOG` still wins when set.
//!
//! ```no_run
//! use libsharecast::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info", false).init();
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "SHARECAST_LOG_FORMAT";
pub const LOG_LEVEL_ENV: &str = "SHARECAST_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain single-line output
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line, colored
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Forces `debug` when `RUST_LOG` is not set
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>, verbose: bool) -> Self {
        Self {
            format,
            level: level.into(),
            verbose,
        }
    }

    /// Read format and level from the environment, falling back to text/info
    pub fn from_env() -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

        Self::new(format, level, false)
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn filter(&self) -> EnvFilter {
        let fallback = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Install the global subscriber
    ///
    /// Returns `false` if a subscriber was already installed, which happens
    /// when several tests in one process initialise logging.
    pub fn init(&self) -> bool {
        let filter = self.filter();

        let result = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init(),
        };

        result.is_ok()
    }
}

/// Initialise logging from `SHARECAST_LOG_FORMAT` and `SHARECAST_LOG_LEVEL`
pub fn init_default() -> bool {
    LoggingConfig::from_env().init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);

        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert!(err.contains("Invalid log format: 'xml'"));
    }

    #[test]
    fn test_log_format_display() {
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(LOG_FORMAT_ENV, "json");
        std::env::set_var(LOG_LEVEL_ENV, "warn");
        let config = LoggingConfig::from_env();
        std::env::remove_var(LOG_FORMAT_ENV);
        std::env::remove_var(LOG_LEVEL_ENV);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "warn");
        assert!(!config.verbose);
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_bad_format() {
        std::env::set_var(LOG_FORMAT_ENV, "yaml");
        let config = LoggingConfig::from_env();
        std::env::remove_var(LOG_FORMAT_ENV);

        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_second_init_is_reported() {
        let config = LoggingConfig::new(LogFormat::Text, "info", false).verbose(true);
        assert!(config.verbose);

        config.init();
        assert!(!config.init());
    }
}
