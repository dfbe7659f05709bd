// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for sender integration tests

use datadog_logs_sender::config::SenderConfig;
use datadog_logs_sender::{Destination, Destinations, Record, Sender, SenderHandle};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Pipeline {
    pub input: mpsc::Sender<Record>,
    pub output: mpsc::Receiver<Record>,
    pub handle: SenderHandle,
}

/// Starts a sender wired to `main` and `additionals`.
#[allow(dead_code)]
pub fn start_pipeline(
    config: &SenderConfig,
    main: Arc<dyn Destination>,
    additionals: Vec<Arc<dyn Destination>>,
    output_capacity: usize,
) -> Pipeline {
    let (input, input_rx) = mpsc::channel(100);
    let (output_tx, output) = mpsc::channel(output_capacity);
    let handle = Sender::new(
        config,
        Destinations::new(main, additionals),
        input_rx,
        output_tx,
    )
    .start();
    Pipeline {
        input,
        output,
        handle,
    }
}

pub fn record(content: &str) -> Record {
    Record::new(content.as_bytes().to_vec())
}

/// Reads everything left on the output once the sender is gone.
#[allow(dead_code)]
pub async fn collect(output: &mut mpsc::Receiver<Record>) -> Vec<String> {
    let mut contents = Vec::new();
    while let Some(record) = output.recv().await {
        contents.push(String::from_utf8(record.content().to_vec()).unwrap());
    }
    contents
}
