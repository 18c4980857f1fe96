//! Log output setup.
//!
//! The crate logs through the `log` facade and opens `tracing` spans around
//! each operation. [`init`] installs one subscriber that receives both.

use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "graph_converge=info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::UnknownFormat(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Unknown log format '{0}', expected 'plain' or 'json'")]
    UnknownFormat(String),

    #[error("A global tracing subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("A global logger is already installed: {0}")]
    Logger(#[from] log::SetLoggerError),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber and forwards `log` records into it.
/// Fails if called twice in one process.
pub fn init(format: LogFormat) -> Result<(), LoggingError> {
    let registry = Registry::default().with(env_filter());

    match format {
        LogFormat::Plain => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))?
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        )?,
    }

    tracing_log::LogTracer::init()?;
    log::debug!("Logging initialized ({:?})", format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_format() {
        assert_eq!("plain".parse::<LogFormat>().unwrap(), LogFormat::Plain);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_init_twice_fails() {
        // Another test in this binary may have won the race; either way the
        // second call must fail.
        let _ = init(LogFormat::Plain);
        assert!(init(LogFormat::Json).is_err());
    }
}
