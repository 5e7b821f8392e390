//! Tracing subscriber setup for the CLI.

use std::io;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt};

/// How log events are rendered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogFormat {
    /// Human readable, one event per line.
    #[default]
    Pretty,
    /// Newline delimited JSON.
    Json,
}

/// Raised when a log format name is not recognised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown log format: {0}")]
pub struct UnknownLogFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(UnknownLogFormat(value.to_owned())),
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Chooses the filter directive: `RUST_LOG` wins, then `--verbose`, then
/// the configured level.
#[must_use]
pub fn filter_directive(rust_log: Option<&str>, level: &str, verbose: bool) -> String {
    match rust_log.map(str::trim) {
        Some(directive) if !directive.is_empty() => directive.to_owned(),
        _ if verbose => String::from("debug"),
        _ => level.to_owned(),
    }
}

/// Installs the global subscriber writing to stderr.
///
/// # Errors
///
/// Returns [`LoggingError::Install`] when a subscriber is already set.
pub fn init(level: &str, format: LogFormat, verbose: bool) -> Result<(), LoggingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = EnvFilter::new(filter_directive(rust_log.as_deref(), level, verbose));
    let builder = fmt().with_env_filter(filter).with_writer(io::stderr);

    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.with_target(false).try_init(),
    };
    installed.map_err(|err| LoggingError::Install(err.to_string()))
}
