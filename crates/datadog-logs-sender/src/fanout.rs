// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of one payload to a [`Destinations`] set.
//!
//! The primary destination is retried for as long as it reports a retryable
//! failure. Once the primary send is over (delivered or terminally failed)
//! the same payload is handed to every additional destination with
//! [`Destination::send_async`](crate::destination::Destination::send_async),
//! exactly once and without waiting for the outcome.
//!
//! ```text
//!   payload ──▶ main.send ──Retryable──┐
//!                  ▲                   │ (wait per RetryStrategy)
//!                  └───────────────────┘
//!                  │ Ok / Terminal
//!                  v
//!           additionals[..].send_async   (fire and forget)
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error};

use crate::destination::{DestinationError, Destinations};
use crate::metrics::SenderMetrics;

/// Pause between two attempts on the primary destination.
///
/// Both strategies retry forever; they only differ in pacing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Retry right away, only yielding to the scheduler in between.
    #[default]
    Immediate,
    /// Doubling delay starting at `base`, capped at `max`.
    Backoff { base: Duration, max: Duration },
}

impl RetryStrategy {
    /// Delay applied after the given failed attempt (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            RetryStrategy::Immediate => Duration::ZERO,
            RetryStrategy::Backoff { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.checked_mul(factor).map_or(max, |delay| delay.min(max))
            }
        }
    }

    async fn wait(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

/// What happens to the records of a batch the primary destination refused
/// with a terminal error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminalFailurePolicy {
    /// Pass them to the next stage as if they had been sent. The failure is
    /// still counted and logged, but the pipeline keeps moving.
    #[default]
    Forward,
    /// Drop them.
    Drop,
}

impl std::str::FromStr for TerminalFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" => Ok(TerminalFailurePolicy::Forward),
            "drop" => Ok(TerminalFailurePolicy::Drop),
            other => Err(format!(
                "unknown terminal failure policy '{other}', expected 'forward' or 'drop'"
            )),
        }
    }
}

/// Outcome of the primary send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed(DestinationError),
    Canceled,
}

#[derive(Debug, Clone)]
pub struct Fanout {
    destinations: Destinations,
    metrics: Arc<SenderMetrics>,
    retry_strategy: RetryStrategy,
}

impl Fanout {
    #[must_use]
    pub fn new(
        destinations: Destinations,
        metrics: Arc<SenderMetrics>,
        retry_strategy: RetryStrategy,
    ) -> Self {
        Self {
            destinations,
            metrics,
            retry_strategy,
        }
    }

    /// Sends the payload to the primary destination, then mirrors it to the
    /// additional ones unless the send was canceled.
    pub async fn send(&self, payload: Bytes) -> Delivery {
        let delivery = self.send_main(&payload).await;
        if delivery != Delivery::Canceled {
            self.send_additionals(&payload);
        }
        delivery
    }

    async fn send_main(&self, payload: &Bytes) -> Delivery {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match self.destinations.main.send(payload.clone()).await {
                Ok(()) => {
                    self.metrics.record_payload_sent();
                    if attempts > 1 {
                        debug!("LOGS | Payload sent after {attempts} attempts");
                    }
                    return Delivery::Sent;
                }
                Err(DestinationError::Canceled) => {
                    debug!("LOGS | Send canceled, dropping payload");
                    return Delivery::Canceled;
                }
                Err(DestinationError::Retryable(e)) => {
                    self.metrics.record_destination_error();
                    debug!("LOGS | Failed to send payload (attempt {attempts}), retrying: {e}");
                    self.retry_strategy.wait(attempts).await;
                }
                Err(e @ DestinationError::Terminal(_)) => {
                    self.metrics.record_destination_error();
                    error!("LOGS | Failed to send payload after {attempts} attempts: {e}");
                    return Delivery::Failed(e);
                }
            }
        }
    }

    fn send_additionals(&self, payload: &Bytes) {
        for destination in &self.destinations.additionals {
            destination.send_async(payload.clone());
        }
    }
}
