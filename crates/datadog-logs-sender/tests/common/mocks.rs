// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory destinations

use async_trait::async_trait;
use bytes::Bytes;
use datadog_logs_sender::{Destination, DestinationError};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Destination keeping every payload it receives. `send` replays a script
/// of results and succeeds once the script is exhausted.
#[derive(Default)]
pub struct MemoryDestination {
    script: Mutex<VecDeque<Result<(), DestinationError>>>,
    sent: Mutex<Vec<Bytes>>,
    mirrored: Mutex<Vec<Bytes>>,
}

#[allow(dead_code)]
impl MemoryDestination {
    pub fn with_script(script: Vec<Result<(), DestinationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    /// Payloads received through `send`, once per attempt.
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    /// Payloads received through `send_async`.
    pub fn mirrored(&self) -> Vec<Bytes> {
        self.mirrored.lock().unwrap().clone()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn send(&self, payload: Bytes) -> Result<(), DestinationError> {
        self.sent.lock().unwrap().push(payload);
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    fn send_async(&self, payload: Bytes) {
        self.mirrored.lock().unwrap().push(payload);
    }
}

/// Destination that never completes a send until the token is cancelled.
#[allow(dead_code)]
pub struct HangingDestination {
    pub cancel_token: CancellationToken,
    attempts: Mutex<usize>,
}

#[allow(dead_code)]
impl HangingDestination {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            attempts: Mutex::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Destination for HangingDestination {
    async fn send(&self, _payload: Bytes) -> Result<(), DestinationError> {
        *self.attempts.lock().unwrap() += 1;
        self.cancel_token.cancelled().await;
        Err(DestinationError::Canceled)
    }

    fn send_async(&self, _payload: Bytes) {}
}
