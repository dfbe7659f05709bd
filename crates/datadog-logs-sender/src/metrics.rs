// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Counters describing what the sender did with its payloads.
//!
//! Purely observational: nothing in the sender reads them back.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sender counters (all values use relaxed atomics).
#[derive(Debug, Default)]
pub struct SenderMetrics {
    destination_errors: AtomicU64,
    payloads_sent: AtomicU64,
    records_forwarded: AtomicU64,
    records_dropped: AtomicU64,
}

impl SenderMetrics {
    /// One failed attempt on the primary destination, retryable or not.
    pub fn record_destination_error(&self) {
        self.destination_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// One payload accepted by the primary destination.
    pub fn record_payload_sent(&self) {
        self.payloads_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self, count: usize) {
        self.records_forwarded
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: usize) {
        self.records_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Captures a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            destination_errors: self.destination_errors.load(Ordering::Relaxed),
            payloads_sent: self.payloads_sent.load(Ordering::Relaxed),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Plain data representation of [`SenderMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub destination_errors: u64,
    pub payloads_sent: u64,
    pub records_forwarded: u64,
    pub records_dropped: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "destination_errors={}, payloads_sent={}, records_forwarded={}, records_dropped={}",
            self.destination_errors,
            self.payloads_sent,
            self.records_forwarded,
            self.records_dropped
        )
    }
}
