// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Accumulation of records into payloads.
//!
//! A [`Payload`] buffers records until it is full or its idle timer fires,
//! at which point the sender drains it into a single encoded payload.
//!
//! # Strategies
//!
//! - **Batch**: up to `max_records` records whose contents add up to at most
//!   `max_content_size` bytes, encoded with a [`Formatter`].
//! - **Single**: a batch with room for exactly one record. Every accepted
//!   record fills it, so it is flushed right away.
//! - **Stream**: no batching at all. Each record is sent as its raw content,
//!   without going through a formatter, and the idle timer never fires.
//!
//! Both limits of a batch are checked when a record is offered, so a
//! successful [`Payload::try_add`] never leaves the payload over either one.

use std::pin::Pin;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::time::{sleep, Instant, Sleep};

use crate::formatter::Formatter;
use crate::message::Record;

/// Idle timer driving time based flushes.
///
/// The timer restarts from a full period on every [`FlushTimer::reset`]. A
/// reset replaces any pending deadline, including one that has already
/// elapsed but has not been observed yet, so a stale expiry can never cause
/// an immediate second flush.
#[derive(Debug)]
pub struct FlushTimer {
    period: Option<Duration>,
    sleep: Pin<Box<Sleep>>,
}

impl FlushTimer {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: Some(period),
            sleep: Box::pin(sleep(period)),
        }
    }

    /// A timer that never fires.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            period: None,
            sleep: Box::pin(sleep(Duration::ZERO)),
        }
    }

    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn reset(&mut self) {
        if let Some(period) = self.period {
            self.sleep.as_mut().reset(Instant::now() + period);
        }
    }

    /// Completes once the current period has elapsed.
    ///
    /// Cancel safe: dropping the future keeps the deadline. Once elapsed,
    /// the timer stays elapsed until it is reset.
    pub async fn fired(&mut self) {
        if self.period.is_some() {
            self.sleep.as_mut().await;
        } else {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Batch {
        max_records: usize,
        max_content_size: usize,
        formatter: Formatter,
    },
    Stream,
}

#[derive(Debug)]
pub struct Payload {
    strategy: Strategy,
    records: Vec<Record>,
    content_size: usize,
    timer: FlushTimer,
}

impl Payload {
    #[must_use]
    pub fn batch(
        max_records: usize,
        max_content_size: usize,
        formatter: Formatter,
        wait: Duration,
    ) -> Self {
        Self {
            strategy: Strategy::Batch {
                max_records,
                max_content_size,
                formatter,
            },
            records: Vec::with_capacity(max_records),
            content_size: 0,
            timer: FlushTimer::new(wait),
        }
    }

    /// One formatted record per payload. There is no content ceiling: an
    /// empty single payload accepts any record.
    #[must_use]
    pub fn single(formatter: Formatter, wait: Duration) -> Self {
        Self::batch(1, usize::MAX, formatter, wait)
    }

    /// Pass-through: every record becomes its own raw payload.
    #[must_use]
    pub fn stream() -> Self {
        Self {
            strategy: Strategy::Stream,
            records: Vec::with_capacity(1),
            content_size: 0,
            timer: FlushTimer::disabled(),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Offers a record to the payload.
    ///
    /// On rejection the record is handed back untouched and the payload is
    /// not modified. A batch rejects a record when it already holds
    /// `max_records` records or when the record's content would push the
    /// total past `max_content_size`. A stream never rejects.
    pub fn try_add(&mut self, record: Record) -> Result<(), Record> {
        let size = record.content_size();
        if let Strategy::Batch {
            max_records,
            max_content_size,
            ..
        } = self.strategy
        {
            let fits = self
                .content_size
                .checked_add(size)
                .is_some_and(|total| total <= max_content_size);
            if self.records.len() >= max_records || !fits {
                return Err(record);
            }
        }
        self.records.push(record);
        self.content_size = self.content_size.saturating_add(size);
        Ok(())
    }

    /// True when no other record can be admitted.
    ///
    /// A batch with spare slots reports not full even if the next record
    /// happens to be too large for the remaining content budget.
    #[must_use]
    pub fn is_full(&self) -> bool {
        match self.strategy {
            Strategy::Batch { max_records, .. } => self.records.len() >= max_records,
            Strategy::Stream => !self.records.is_empty(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn content_size(&self) -> usize {
        self.content_size
    }

    /// Buffered records, in admission order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Drops every buffered record and restarts the idle timer.
    pub fn clear(&mut self) {
        self.records.clear();
        self.content_size = 0;
        self.timer.reset();
    }

    /// Encodes the buffered records. Empty when nothing is buffered.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        if self.records.is_empty() {
            return Bytes::new();
        }
        match self.strategy {
            Strategy::Batch { formatter, .. } => formatter.format(&self.records),
            Strategy::Stream => {
                if let [record] = self.records.as_slice() {
                    return record.content().clone();
                }
                let mut buffer = BytesMut::with_capacity(self.content_size);
                for record in &self.records {
                    buffer.put_slice(record.content());
                }
                buffer.freeze()
            }
        }
    }

    /// Encodes the buffered records and hands them out, leaving the payload
    /// cleared with a fresh idle period. Returns `None` when empty.
    pub fn drain(&mut self) -> Option<(Bytes, Vec<Record>)> {
        if self.is_empty() {
            return None;
        }
        let content = self.encode();
        let capacity = self.records.capacity();
        let records = std::mem::replace(&mut self.records, Vec::with_capacity(capacity));
        self.clear();
        Some((content, records))
    }

    /// Completes when the idle period has elapsed since the last reset.
    pub async fn ready(&mut self) {
        self.timer.fired().await;
    }

    pub fn reset_timer(&mut self) {
        self.timer.reset();
    }
}
