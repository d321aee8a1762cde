// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tracing subscriber setup.

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

const LOG_ENV_VAR: &str = "RUST_LOG";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silent,
    #[default]
    Normal,
    Verbose,
}

impl LogLevel {
    fn filter(&self) -> LevelFilter {
        match self {
            LogLevel::Silent => LevelFilter::OFF,
            LogLevel::Normal => LevelFilter::INFO,
            LogLevel::Verbose => LevelFilter::DEBUG,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid {LOG_ENV_VAR} filter")]
    Filter(#[source] tracing_subscriber::filter::FromEnvError),
    #[error("a global subscriber is already installed")]
    AlreadyInstalled(#[source] tracing_subscriber::util::TryInitError),
}

/// Installs the global subscriber. `RUST_LOG` overrides `level` when set.
pub fn init(level: LogLevel) -> Result<(), LoggingError> {
    let filter = if std::env::var_os(LOG_ENV_VAR).is_some() {
        EnvFilter::try_from_env(LOG_ENV_VAR).map_err(LoggingError::Filter)?
    } else {
        EnvFilter::default().add_directive(level.filter().into())
    };

    let layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    Registry::default()
        .with(layer)
        .try_init()
        .map_err(LoggingError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filters() {
        assert_eq!(LogLevel::Silent.filter(), LevelFilter::OFF);
        assert_eq!(LogLevel::default().filter(), LevelFilter::INFO);
        assert_eq!(LogLevel::Verbose.filter(), LevelFilter::DEBUG);
    }
}
