// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The dispatch loop.
//!
//! A [`Sender`] runs as a single tokio task. It owns its [`Payload`], reads
//! records from the input channel and flushes the payload when:
//!
//! 1. a record fills it, or does not fit into it (the record is then added
//!    to the freshly flushed payload),
//! 2. the idle timer fires (no-op when empty),
//! 3. the input channel is closed (final flush, then the task ends).
//!
//! After every flush the idle timer starts a new full period.
//!
//! # Flush
//!
//! The payload is drained, delivered through the [`Fanout`], and its records
//! are sent one by one, in order, on the output channel. Nothing else runs
//! while a flush is in progress, so a slow primary destination or a slow
//! output consumer holds the input back.
//!
//! | Primary outcome | Records                                    |
//! |-----------------|--------------------------------------------|
//! | sent            | forwarded                                  |
//! | terminal error  | forwarded, or dropped with `Drop` policy   |
//! | canceled        | dropped                                    |
//!
//! # Shutdown
//!
//! Dropping every input sender, or calling [`SenderHandle::stop`], closes
//! the input. Records already queued in the channel are still processed
//! before the final flush.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SenderConfig;
use crate::destination::Destinations;
use crate::error::SenderError;
use crate::fanout::{Delivery, Fanout, TerminalFailurePolicy};
use crate::message::Record;
use crate::metrics::SenderMetrics;
use crate::payload::Payload;

pub struct Sender {
    input: mpsc::Receiver<Record>,
    output: mpsc::Sender<Record>,
    payload: Payload,
    fanout: Fanout,
    terminal_failure_policy: TerminalFailurePolicy,
    metrics: Arc<SenderMetrics>,
}

impl Sender {
    /// Creates a sender. Must be called from within a tokio runtime: the
    /// idle timer is armed immediately.
    #[must_use]
    pub fn new(
        config: &SenderConfig,
        destinations: Destinations,
        input: mpsc::Receiver<Record>,
        output: mpsc::Sender<Record>,
    ) -> Self {
        Self::with_payload(config.new_payload(), config, destinations, input, output)
    }

    #[must_use]
    pub fn with_payload(
        payload: Payload,
        config: &SenderConfig,
        destinations: Destinations,
        input: mpsc::Receiver<Record>,
        output: mpsc::Sender<Record>,
    ) -> Self {
        let metrics = Arc::new(SenderMetrics::default());
        Self {
            input,
            output,
            payload,
            fanout: Fanout::new(destinations, Arc::clone(&metrics), config.retry_strategy),
            terminal_failure_policy: config.terminal_failure_policy,
            metrics,
        }
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<SenderMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Spawns the dispatch loop.
    #[must_use]
    pub fn start(self) -> SenderHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let metrics = self.metrics();
        let task = tokio::spawn(self.run(stop_rx));
        SenderHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
            metrics,
        }
    }

    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) {
        debug!("LOGS | Sender started");
        let mut stop_pending = true;

        loop {
            tokio::select! {
                biased;
                result = &mut stop_rx, if stop_pending => {
                    stop_pending = false;
                    // An error only means the handle was dropped.
                    if result.is_ok() {
                        debug!("LOGS | Sender stopping, draining input");
                        self.input.close();
                    }
                }
                record = self.input.recv() => match record {
                    Some(record) => self.process(record).await,
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                () = self.payload.ready() => {
                    self.flush().await;
                    self.payload.reset_timer();
                }
            }
        }

        debug!("LOGS | Sender stopped: {}", self.metrics.snapshot());
    }

    async fn process(&mut self, record: Record) {
        match self.payload.try_add(record) {
            Ok(()) => {
                if self.payload.is_full() {
                    self.flush_and_reset().await;
                }
            }
            Err(rejected) => {
                self.flush_and_reset().await;
                match self.payload.try_add(rejected) {
                    Ok(()) => {
                        if self.payload.is_full() {
                            self.flush_and_reset().await;
                        }
                    }
                    Err(rejected) => {
                        warn!(
                            "LOGS | Dropping record of {} bytes: larger than the maximum payload content size",
                            rejected.content_size()
                        );
                        self.metrics.record_dropped(1);
                    }
                }
            }
        }
    }

    async fn flush_and_reset(&mut self) {
        self.flush().await;
        self.payload.reset_timer();
    }

    /// Sends the buffered records and forwards them downstream.
    async fn flush(&mut self) {
        let Some((content, records)) = self.payload.drain() else {
            return;
        };

        match self.fanout.send(content).await {
            Delivery::Sent => {}
            Delivery::Canceled => {
                self.metrics.record_dropped(records.len());
                return;
            }
            Delivery::Failed(_) => {
                if self.terminal_failure_policy == TerminalFailurePolicy::Drop {
                    warn!(
                        "LOGS | Dropping {} records after a non retryable send failure",
                        records.len()
                    );
                    self.metrics.record_dropped(records.len());
                    return;
                }
            }
        }

        self.forward(records).await;
    }

    async fn forward(&mut self, records: Vec<Record>) {
        let total = records.len();
        for (sent, record) in records.into_iter().enumerate() {
            if self.output.send(record).await.is_err() {
                warn!(
                    "LOGS | Output channel closed, {} records not forwarded",
                    total - sent
                );
                self.metrics.record_forwarded(sent);
                return;
            }
        }
        self.metrics.record_forwarded(total);
    }
}

/// Controls a running [`Sender`].
#[derive(Debug)]
pub struct SenderHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    metrics: Arc<SenderMetrics>,
}

impl SenderHandle {
    /// Closes the input and waits for the final flush to complete.
    ///
    /// Records already queued in the input channel are flushed as well.
    pub async fn stop(&mut self) -> Result<(), SenderError> {
        let task = self.task.take().ok_or(SenderError::AlreadyStopped)?;
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already be gone if every input sender was dropped.
            let _ = stop_tx.send(());
        }
        task.await?;
        Ok(())
    }

    /// Waits for the sender to finish on its own, i.e. once every input
    /// sender has been dropped.
    pub async fn wait(&mut self) -> Result<(), SenderError> {
        let task = self.task.take().ok_or(SenderError::AlreadyStopped)?;
        task.await?;
        Ok(())
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<SenderMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{Destination, DestinationError};
    use crate::formatter::Formatter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingDestination {
        sent: Mutex<Vec<Bytes>>,
        fail_with: Mutex<Option<DestinationError>>,
    }

    #[async_trait]
    impl Destination for RecordingDestination {
        async fn send(&self, payload: Bytes) -> Result<(), DestinationError> {
            self.sent.lock().unwrap().push(payload);
            match self.fail_with.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn send_async(&self, payload: Bytes) {
            self.sent.lock().unwrap().push(payload);
        }
    }

    fn record(content: &str) -> Record {
        Record::new(content.as_bytes().to_vec())
    }

    fn config(batch_max_size: usize, batch_max_content_size: usize) -> SenderConfig {
        SenderConfig {
            batch_max_size,
            batch_max_content_size,
            batch_wait: Duration::from_millis(50),
            format: Formatter::Line,
            ..Default::default()
        }
    }

    fn start(
        config: &SenderConfig,
        main: Arc<RecordingDestination>,
    ) -> (mpsc::Sender<Record>, mpsc::Receiver<Record>, SenderHandle) {
        let (input_tx, input_rx) = mpsc::channel(100);
        let (output_tx, output_rx) = mpsc::channel(100);
        let sender = Sender::new(config, Destinations::new(main, vec![]), input_rx, output_tx);
        (input_tx, output_rx, sender.start())
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_when_full() {
        let main = Arc::new(RecordingDestination::default());
        let (input, mut output, _handle) = start(&config(2, 1000), Arc::clone(&main));

        input.send(record("a")).await.unwrap();
        input.send(record("b")).await.unwrap();

        assert_eq!(output.recv().await.unwrap(), record("a"));
        assert_eq!(output.recv().await.unwrap(), record("b"));
        assert_eq!(main.sent.lock().unwrap().as_slice(), [Bytes::from_static(b"a\nb\n")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_on_idle_timeout() {
        let main = Arc::new(RecordingDestination::default());
        let (input, mut output, _handle) = start(&config(10, 1000), Arc::clone(&main));

        input.send(record("a")).await.unwrap();
        let start = tokio::time::Instant::now();
        assert_eq!(output.recv().await.unwrap(), record("a"));

        assert!(start.elapsed() <= Duration::from_millis(50));
        assert_eq!(main.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flushes_remaining_records() {
        let main = Arc::new(RecordingDestination::default());
        let (input, mut output, mut handle) = start(&config(10, 1000), Arc::clone(&main));

        input.send(record("a")).await.unwrap();
        input.send(record("b")).await.unwrap();
        handle.stop().await.unwrap();

        assert_eq!(output.recv().await.unwrap(), record("a"));
        assert_eq!(output.recv().await.unwrap(), record("b"));
        assert!(handle.is_finished());
        assert!(matches!(handle.stop().await, Err(SenderError::AlreadyStopped)));
        assert!(input.send(record("c")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_input_ends_the_sender() {
        let main = Arc::new(RecordingDestination::default());
        let (input, mut output, mut handle) = start(&config(10, 1000), Arc::clone(&main));

        input.send(record("a")).await.unwrap();
        drop(input);
        handle.wait().await.unwrap();

        assert_eq!(output.recv().await.unwrap(), record("a"));
        assert!(output.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_policy_discards_failed_batch() {
        let main = Arc::new(RecordingDestination::default());
        *main.fail_with.lock().unwrap() = Some(DestinationError::Terminal("400".to_string()));
        let config = SenderConfig {
            terminal_failure_policy: TerminalFailurePolicy::Drop,
            ..config(1, 1000)
        };
        let (input, mut output, mut handle) = start(&config, Arc::clone(&main));

        input.send(record("a")).await.unwrap();
        handle.stop().await.unwrap();

        assert!(output.recv().await.is_none());
        let snapshot = handle.metrics().snapshot();
        assert_eq!(snapshot.destination_errors, 1);
        assert_eq!(snapshot.records_dropped, 1);
        assert_eq!(snapshot.records_forwarded, 0);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_record_larger_than_content_size_is_dropped() {
        let main = Arc::new(RecordingDestination::default());
        let (_input_tx, input_rx) = mpsc::channel(10);
        let (output_tx, mut output) = mpsc::channel(10);
        let mut sender = Sender::new(
            &config(10, 4),
            Destinations::new(Arc::clone(&main) as Arc<dyn Destination>, vec![]),
            input_rx,
            output_tx,
        );

        sender.process(record("ab")).await;
        sender.process(record("too large")).await;

        assert_eq!(output.recv().await.unwrap(), record("ab"));
        assert!(sender.payload.is_empty());
        assert_eq!(sender.metrics().snapshot().records_dropped, 1);
        assert!(logs_contain("larger than the maximum payload content size"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_sends_raw_records_one_by_one() {
        let main = Arc::new(RecordingDestination::default());
        let (input_tx, input_rx) = mpsc::channel(10);
        let (output_tx, mut output) = mpsc::channel(10);
        let config = SenderConfig {
            strategy: crate::config::SenderStrategy::Stream,
            ..Default::default()
        };
        let mut handle = Sender::new(
            &config,
            Destinations::new(Arc::clone(&main) as Arc<dyn Destination>, vec![]),
            input_rx,
            output_tx,
        )
        .start();

        input_tx.send(record("one")).await.unwrap();
        input_tx.send(record("two")).await.unwrap();
        handle.stop().await.unwrap();

        assert_eq!(output.recv().await.unwrap(), record("one"));
        assert_eq!(output.recv().await.unwrap(), record("two"));
        assert_eq!(
            main.sent.lock().unwrap().as_slice(),
            [Bytes::from_static(b"one"), Bytes::from_static(b"two")]
        );
    }
}
