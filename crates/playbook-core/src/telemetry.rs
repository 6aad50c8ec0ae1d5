//! Tracing setup for processes embedding the playbook engine.
//!
//! The library only emits events (see [`crate::obs`]); installing a
//! subscriber is left to the host. [`init_from_config`] does it from a
//! [`PlaybookConfig`], so `PLAYBOOK_LOG_FORMAT` and `PLAYBOOK_LOG` drive the
//! output. `PLAYBOOK_LOG` accepts `EnvFilter` directives and falls back to
//! `RUST_LOG`, then to the configured level.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::PlaybookConfig;
use crate::error::{PlaybookError, Result};

/// Filter directives read before `RUST_LOG`.
pub const LOG_FILTER_ENV: &str = "PLAYBOOK_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event, fields flattened.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Parse a level name such as `info` or `DEBUG`.
pub fn parse_level(raw: &str) -> Result<Level> {
    raw.trim()
        .parse::<Level>()
        .map_err(|_| PlaybookError::InvalidConfig(format!("unknown log level {raw:?}")))
}

fn build_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed; the earlier one
/// stays in place.
pub fn init_tracing(format: LogFormat, default_level: Level) -> bool {
    let registry = tracing_subscriber::registry().with(build_filter(default_level));
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .json()
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
    }
    .is_ok();

    if !installed {
        debug!(event = "telemetry.already_installed", format = %format);
    }
    installed
}

/// Install the global subscriber using the logging settings in `config`.
pub fn init_from_config(config: &PlaybookConfig) -> Result<bool> {
    let level = parse_level(&config.log_level)?;
    Ok(init_tracing(config.log_format, level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default(), LogFormat::Text);
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(
            parse_level("chatty").unwrap_err(),
            PlaybookError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_init_from_config_installs_once() {
        let config = PlaybookConfig::default();
        init_from_config(&config).unwrap();
        // a subscriber is now installed either way
        assert!(!init_tracing(LogFormat::Json, Level::INFO));
        tracing::info!(event = "telemetry.test");
    }

    #[test]
    fn test_init_from_config_rejects_bad_level() {
        let mut config = PlaybookConfig::default();
        config.log_level = "chatty".to_string();
        assert!(init_from_config(&config).is_err());
    }
}
