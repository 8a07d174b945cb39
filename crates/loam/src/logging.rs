//! Logging configuration and initialisation.
//!
//! Loam's library crates only emit events through `tracing`. Applications
//! that want to see them install a subscriber, either their own or the
//! one built here.

use std::error::Error;
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::{fmt as layer_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging.
    Json,
    /// Human-readable multi-line output.
    #[default]
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `"info"` or `"loam_arena=debug"`.
    pub level: String,
    /// Write JSON output to this file instead of stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

impl LogConfig {
    /// Config with the given filter directive.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Config with the given format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Config writing to `path`. Only honoured for [`LogFormat::Json`].
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Errors from [`init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// The filter directive did not parse.
    InvalidFilter(String),
    /// The output file could not be created.
    FileOpen(String),
    /// A global subscriber is already installed.
    AlreadyInitialized,
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter(reason) => write!(f, "invalid log filter: {reason}"),
            Self::FileOpen(reason) => write!(f, "failed to open log file: {reason}"),
            Self::AlreadyInitialized => write!(f, "subscriber already initialized"),
        }
    }
}

impl Error for LogError {}

/// Parse a filter directive without installing anything.
pub fn parse_filter(level: &str) -> Result<EnvFilter, LogError> {
    EnvFilter::try_new(level).map_err(|e| LogError::InvalidFilter(e.to_string()))
}

/// Install the global tracing subscriber described by `config`.
///
/// Call once at application startup. A second call returns
/// [`LogError::AlreadyInitialized`].
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = parse_filter(&config.level)?;
    match config.format {
        LogFormat::Json => init_json(filter, config.output_path.as_ref()),
        LogFormat::Pretty => init_pretty(filter),
    }?;
    tracing::debug!(level = %config.level, format = ?config.format, "logging initialised");
    Ok(())
}

fn init_json(filter: EnvFilter, path: Option<&PathBuf>) -> Result<(), LogError> {
    let registry = tracing_subscriber::registry().with(filter);
    match path {
        Some(path) => {
            let file = File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))?;
            registry
                .with(layer_fmt::layer().json().with_writer(Mutex::new(file)))
                .try_init()
        }
        None => registry.with(layer_fmt::layer().json()).try_init(),
    }
    .map_err(|_| LogError::AlreadyInitialized)
}

fn init_pretty(filter: EnvFilter) -> Result<(), LogError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(layer_fmt::layer().pretty())
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_pretty_info_on_stderr() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.level, "info");
        assert!(config.output_path.is_none());
    }

    #[test]
    fn builders_chain() {
        let config = LogConfig::default()
            .with_level("loam_arena=debug")
            .with_format(LogFormat::Json)
            .with_output("/tmp/loam.log");
        assert_eq!(config.level, "loam_arena=debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output_path, Some(PathBuf::from("/tmp/loam.log")));
    }

    #[test]
    fn bad_filter_rejected() {
        let err = parse_filter("loam_arena=verbose").unwrap_err();
        assert!(matches!(err, LogError::InvalidFilter(_)));
        assert!(err.to_string().starts_with("invalid log filter"));
    }

    #[test]
    fn valid_filters_parse() {
        for level in ["info", "debug", "loam_arena=trace,warn"] {
            assert!(parse_filter(level).is_ok(), "{level}");
        }
    }

    #[test]
    fn second_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig::default()
            .with_format(LogFormat::Json)
            .with_output(dir.path().join("loam.json"));
        // Another test in this binary may have installed one already;
        // either way the second call must fail.
        let _ = init_logging(&config);
        assert_eq!(init_logging(&config), Err(LogError::AlreadyInitialized));
    }
}
