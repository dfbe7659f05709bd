// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors returned by the sender lifecycle. Delivery failures are never
/// reported here: they are retried, dropped or forwarded by the sender.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("Sender already stopped")]
    AlreadyStopped,

    #[error("Sender task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
