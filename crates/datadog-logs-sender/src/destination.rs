// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations a payload can be delivered to.
//!
//! A destination owns its transport and decides how each failure is
//! classified. The sender only branches on that classification:
//!
//! | Error       | Primary behavior                          |
//! |-------------|-------------------------------------------|
//! | `Retryable` | retried until it succeeds                 |
//! | `Terminal`  | recorded, records handled by policy       |
//! | `Canceled`  | batch dropped, nothing recorded           |

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum DestinationError {
    /// Transient failure; sending the same payload again is safe.
    #[error("retryable send error: {0}")]
    Retryable(String),

    /// The send was aborted because the process is shutting down.
    #[error("send canceled")]
    Canceled,

    /// Failure that will not go away by retrying (bad payload, bad URL,
    /// invalid API key...).
    #[error("send failed: {0}")]
    Terminal(String),
}

impl DestinationError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DestinationError::Retryable(_))
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, DestinationError::Canceled)
    }
}

/// A remote collector.
///
/// Implementations are shared by every sender using the same destination
/// set and must be safe to call concurrently without external locking.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Sends the payload, returning once it is delivered or has failed.
    async fn send(&self, payload: Bytes) -> Result<(), DestinationError>;

    /// Starts a best-effort send in the background and returns immediately.
    /// The outcome is never reported back.
    fn send_async(&self, payload: Bytes);
}

/// One primary destination plus any number of additional ones.
///
/// Senders hold a shared reference; they never shut destinations down.
#[derive(Clone)]
pub struct Destinations {
    pub main: Arc<dyn Destination>,
    pub additionals: Vec<Arc<dyn Destination>>,
}

impl Destinations {
    #[must_use]
    pub fn new(main: Arc<dyn Destination>, additionals: Vec<Arc<dyn Destination>>) -> Self {
        Self { main, additionals }
    }
}

impl std::fmt::Debug for Destinations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destinations")
            .field("additionals", &self.additionals.len())
            .finish_non_exhaustive()
    }
}
