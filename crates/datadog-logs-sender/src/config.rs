// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sender and HTTP destination configuration.
//!
//! Every value can be set through a `DD_` prefixed environment variable;
//! anything unset falls back to the defaults in [`crate::constants`].
//! Configuration is read once when a sender is built and never changes
//! afterwards.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DD_LOGS_CONFIG_BATCH_MAX_SIZE` | 20 |
//! | `DD_LOGS_CONFIG_BATCH_MAX_CONTENT_SIZE` | 1000000 |
//! | `DD_LOGS_CONFIG_BATCH_WAIT` (seconds) | 5 |
//! | `DD_LOGS_CONFIG_SENDER_STRATEGY` (`batch`, `single`, `stream`) | batch |
//! | `DD_LOGS_CONFIG_FORMAT` (`line`, `array`) | array |
//! | `DD_LOGS_CONFIG_TERMINAL_FAILURE_POLICY` (`forward`, `drop`) | forward |
//! | `DD_LOGS_CONFIG_RETRY_BACKOFF_MS` (0 = immediate) | 0 |
//! | `DD_API_KEY` | |
//! | `DD_LOGS_CONFIG_LOGS_DD_URL` | `https://http-intake.logs.datadoghq.com` |
//! | `DD_LOGS_CONFIG_USE_COMPRESSION` | true |
//! | `DD_LOGS_CONFIG_COMPRESSION_LEVEL` | 6 |
//! | `DD_FLUSH_TIMEOUT` (seconds) | 30 |
//! | `DD_LOGS_CONFIG_ADDITIONAL_ENDPOINTS` (JSON) | `[]` |
//! | `DD_PROXY_HTTPS` / `HTTPS_PROXY` | |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::error;

use crate::constants;
use crate::error::ConfigError;
use crate::fanout::{RetryStrategy, TerminalFailurePolicy};
use crate::formatter::Formatter;
use crate::payload::Payload;

/// Upper bound of the doubling delay when a retry backoff is configured.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// How records are grouped into payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SenderStrategy {
    #[default]
    Batch,
    Single,
    Stream,
}

impl FromStr for SenderStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "batch" => Ok(SenderStrategy::Batch),
            "single" => Ok(SenderStrategy::Single),
            "stream" => Ok(SenderStrategy::Stream),
            other => Err(format!(
                "unknown strategy '{other}', expected 'batch', 'single' or 'stream'"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    pub batch_max_size: usize,
    pub batch_max_content_size: usize,
    pub batch_wait: Duration,
    pub strategy: SenderStrategy,
    pub format: Formatter,
    pub terminal_failure_policy: TerminalFailurePolicy,
    pub retry_strategy: RetryStrategy,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            batch_max_size: constants::DEFAULT_BATCH_MAX_SIZE,
            batch_max_content_size: constants::DEFAULT_BATCH_MAX_CONTENT_SIZE,
            batch_wait: constants::DEFAULT_BATCH_WAIT,
            strategy: SenderStrategy::default(),
            format: Formatter::default(),
            terminal_failure_policy: TerminalFailurePolicy::default(),
            retry_strategy: RetryStrategy::default(),
        }
    }
}

impl SenderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let batch_max_size = parse_or(&lookup, "DD_LOGS_CONFIG_BATCH_MAX_SIZE")?
            .unwrap_or(defaults.batch_max_size);
        let batch_max_content_size =
            parse_or(&lookup, "DD_LOGS_CONFIG_BATCH_MAX_CONTENT_SIZE")?
                .unwrap_or(defaults.batch_max_content_size);
        let batch_wait = match parse_or::<f64, _>(&lookup, "DD_LOGS_CONFIG_BATCH_WAIT")? {
            Some(secs) => Duration::try_from_secs_f64(secs).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "DD_LOGS_CONFIG_BATCH_WAIT".to_string(),
                    value: secs.to_string(),
                    reason: e.to_string(),
                }
            })?,
            None => defaults.batch_wait,
        };
        let strategy = parse_or(&lookup, "DD_LOGS_CONFIG_SENDER_STRATEGY")?
            .unwrap_or(defaults.strategy);
        let format = parse_or(&lookup, "DD_LOGS_CONFIG_FORMAT")?.unwrap_or(defaults.format);
        let terminal_failure_policy =
            parse_or(&lookup, "DD_LOGS_CONFIG_TERMINAL_FAILURE_POLICY")?
                .unwrap_or(defaults.terminal_failure_policy);
        let retry_strategy = match parse_or::<u64, _>(&lookup, "DD_LOGS_CONFIG_RETRY_BACKOFF_MS")? {
            Some(0) | None => RetryStrategy::Immediate,
            Some(ms) => RetryStrategy::Backoff {
                base: Duration::from_millis(ms),
                max: MAX_RETRY_BACKOFF.max(Duration::from_millis(ms)),
            },
        };

        let config = Self {
            batch_max_size,
            batch_max_content_size,
            batch_wait,
            strategy,
            format,
            terminal_failure_policy,
            retry_strategy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_max_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch max size must be greater than 0".to_string(),
            ));
        }
        if self.batch_max_content_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch max content size must be greater than 0".to_string(),
            ));
        }
        if self.batch_wait.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "batch wait must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the empty payload matching this configuration.
    #[must_use]
    pub fn new_payload(&self) -> Payload {
        match self.strategy {
            SenderStrategy::Batch => Payload::batch(
                self.batch_max_size,
                self.batch_max_content_size,
                self.format,
                self.batch_wait,
            ),
            SenderStrategy::Single => Payload::single(self.format, self.batch_wait),
            SenderStrategy::Stream => Payload::stream(),
        }
    }
}

/// Additional logs intake receiving a best-effort copy of every payload.
#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct LogsAdditionalEndpoint {
    pub api_key: String,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Port")]
    pub port: u32,
    pub is_reliable: bool,
}

impl LogsAdditionalEndpoint {
    #[must_use]
    pub fn url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

/// Parses the JSON list of additional endpoints, e.g.
/// `[{"api_key":"key2","Host":"logs.datadoghq.eu","Port":443,"is_reliable":true}]`.
///
/// Invalid JSON is logged and yields no endpoint so the primary path keeps
/// working with a broken additional configuration.
fn parse_logs_additional_endpoints(raw: &str) -> Vec<LogsAdditionalEndpoint> {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        error!("Failed to deserialize DD_LOGS_CONFIG_ADDITIONAL_ENDPOINTS: {err}");
        vec![]
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpDestinationConfig {
    pub api_key: String,
    pub logs_dd_url: String,
    pub use_compression: bool,
    pub compression_level: i32,
    pub flush_timeout: Duration,
    pub https_proxy: Option<String>,
    pub additional_endpoints: Vec<LogsAdditionalEndpoint>,
}

impl Default for HttpDestinationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            logs_dd_url: constants::DEFAULT_LOGS_DD_URL.to_string(),
            use_compression: true,
            compression_level: constants::DEFAULT_COMPRESSION_LEVEL,
            flush_timeout: Duration::from_secs(constants::DEFAULT_FLUSH_TIMEOUT_SECS),
            https_proxy: None,
            additional_endpoints: Vec::new(),
        }
    }
}

impl HttpDestinationConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_key = lookup("DD_API_KEY")
            .map(|key| key.trim().to_string())
            .unwrap_or_default();
        let logs_dd_url = lookup("DD_LOGS_CONFIG_LOGS_DD_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.logs_dd_url);
        let use_compression = lookup("DD_LOGS_CONFIG_USE_COMPRESSION")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.use_compression);
        let compression_level = parse_or(&lookup, "DD_LOGS_CONFIG_COMPRESSION_LEVEL")?
            .unwrap_or(defaults.compression_level);
        let flush_timeout = parse_or::<u64, _>(&lookup, "DD_FLUSH_TIMEOUT")?
            .map_or(defaults.flush_timeout, Duration::from_secs);
        let https_proxy = lookup("DD_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY"));
        let additional_endpoints = lookup("DD_LOGS_CONFIG_ADDITIONAL_ENDPOINTS")
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_logs_additional_endpoints(&raw))
            .unwrap_or_default();

        let config = Self {
            api_key,
            logs_dd_url,
            use_compression,
            compression_level,
            flush_timeout,
            https_proxy,
            additional_endpoints,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "DD_API_KEY must be set".to_string(),
            ));
        }
        if !self.logs_dd_url.starts_with("http://") && !self.logs_dd_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid logs intake URL '{}': expected an http(s) URL",
                self.logs_dd_url
            )));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid compression level {}: must be between 1 and 22",
                self.compression_level
            )));
        }
        if self.flush_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "flush timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}
