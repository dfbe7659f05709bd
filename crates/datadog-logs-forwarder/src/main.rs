// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use datadog_logs_sender::{
    config::{HttpDestinationConfig, SenderConfig},
    error::SenderError,
    http::build_destinations,
    message::Origin,
    Record, Sender, SenderHandle,
};
use tokio_util::sync::CancellationToken;

mod logger;

const INPUT_CHANNEL_CAPACITY: usize = 1024;
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;
const STDIN_IDENTIFIER: &str = "stdin";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    if let Err(e) = logger::init(&log_level) {
        eprintln!("DD_LOGS_FORWARDER | ERROR | {e}");
        return;
    }
    debug!("Logging subsystem enabled");

    let sender_config = match SenderConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating sender config on logs forwarder startup: {e}");
            return;
        }
    };
    let destination_config = match HttpDestinationConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating destination config on logs forwarder startup: {e}");
            return;
        }
    };
    let tags = parse_tags(&env::var("DD_TAGS").unwrap_or_default());

    let cancel_token = CancellationToken::new();
    let destinations = match build_destinations(&destination_config, cancel_token.clone()) {
        Ok(d) => d,
        Err(e) => {
            error!("Error creating destinations on logs forwarder startup: {e}");
            return;
        }
    };
    info!(
        "Forwarding logs to {} with {} additional endpoint(s)",
        destination_config.logs_dd_url,
        destinations.additionals.len()
    );

    let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    let mut handle = Sender::new(&sender_config, destinations, input_rx, output_tx).start();
    let auditor = tokio::spawn(audit(output_rx));
    let mut reader = tokio::spawn(read_records(
        BufReader::new(tokio::io::stdin()),
        tags,
        input_tx,
    ));

    tokio::select! {
        result = &mut reader => match result {
            Ok(Ok(count)) => debug!("Reached end of input after {count} records"),
            Ok(Err(e)) => error!("Failed to read from stdin: {e}"),
            Err(e) => error!("Stdin reader task failed: {e}"),
        },
        () = interrupted() => {
            info!("Interrupted, canceling in-flight sends");
            cancel_token.cancel();
            reader.abort();
        }
    }

    if let Err(e) = stop_sender(&mut handle, &cancel_token, interrupted()).await {
        error!("Logs sender did not stop cleanly: {e}");
    }
    match auditor.await {
        Ok(progress) => info!(
            "Committed {} records, last offset {}",
            progress.committed,
            progress.last_offset.as_deref().unwrap_or("none")
        ),
        Err(e) => error!("Auditor task failed: {e}"),
    }
    info!("Shutting down: {}", handle.metrics().snapshot());
}

/// Completes on SIGINT/ctrl-c. Never completes when the signal cannot be
/// listened for.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

/// Stops the sender and waits for its final flush. An interrupt arriving
/// before the flush completes cancels in-flight sends, which makes the
/// flush drop its batch instead of retrying forever.
async fn stop_sender<F>(
    handle: &mut SenderHandle,
    cancel_token: &CancellationToken,
    interrupt: F,
) -> Result<(), SenderError>
where
    F: Future<Output = ()>,
{
    let stop = handle.stop();
    tokio::pin!(stop);

    tokio::select! {
        result = &mut stop => result,
        () = interrupt => {
            info!("Interrupted during shutdown, canceling in-flight sends");
            cancel_token.cancel();
            stop.await
        }
    }
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turns every non-empty line into a record. Returns the number of records
/// read once the input is exhausted or the sender is gone.
async fn read_records<R>(
    reader: R,
    tags: Vec<String>,
    input: mpsc::Sender<Record>,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_number: u64 = 0;
    let mut count: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record = Record::new(line.into_bytes())
            .with_origin(Origin {
                identifier: STDIN_IDENTIFIER.to_string(),
                offset: line_number.to_string(),
            })
            .with_tags(tags.clone());
        if input.send(record).await.is_err() {
            debug!("Sender input closed, stopping stdin reader");
            break;
        }
        count += 1;
    }
    Ok(count)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct AuditProgress {
    committed: u64,
    last_offset: Option<String>,
}

/// Drains the sender output, remembering the position of the last record
/// that made it through.
async fn audit(mut output: mpsc::Receiver<Record>) -> AuditProgress {
    let mut progress = AuditProgress::default();
    while let Some(record) = output.recv().await {
        progress.committed += 1;
        if let Some(origin) = record.origin() {
            progress.last_offset = Some(origin.offset.clone());
        }
    }
    progress
}
