// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP destination for the Datadog logs intake.
//!
//! Payloads are POSTed to `<url>/api/v2/logs`, optionally zstd compressed.
//! The response is mapped onto [`DestinationError`]:
//!
//! | Outcome                          | Classification |
//! |----------------------------------|----------------|
//! | 2xx                              | `Ok`           |
//! | 408, 429, 5xx, transport error   | `Retryable`    |
//! | any other status                 | `Terminal`     |
//! | shared cancellation token fired  | `Canceled`     |

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use zstd::stream::write::Encoder;

use crate::config::HttpDestinationConfig;
use crate::constants;
use crate::destination::{Destination, DestinationError, Destinations};
use crate::error::ConfigError;

/// Creates the HTTP client shared by every destination.
///
/// An invalid proxy is logged and ignored rather than failing startup.
#[must_use]
pub fn get_client(config: &HttpDestinationConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "LOGS | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "LOGS | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &HttpDestinationConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut client = reqwest::Client::builder()
        .timeout(config.flush_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            client = client.proxy(reqwest::Proxy::https(https_uri.as_str())?);
        }
    }

    client.build()
}

/// Builds the primary destination and one destination per additional
/// endpoint, all sharing the same client and cancellation token.
pub fn build_destinations(
    config: &HttpDestinationConfig,
    cancel_token: CancellationToken,
) -> Result<Destinations, ConfigError> {
    let client = get_client(config);

    let main = HttpDestination::new(
        client.clone(),
        &config.logs_dd_url,
        &config.api_key,
        config,
        cancel_token.clone(),
    )?;

    let mut additionals: Vec<Arc<dyn Destination>> = Vec::new();
    for endpoint in &config.additional_endpoints {
        additionals.push(Arc::new(HttpDestination::new(
            client.clone(),
            &endpoint.url(),
            &endpoint.api_key,
            config,
            cancel_token.clone(),
        )?));
    }

    Ok(Destinations::new(Arc::new(main), additionals))
}

#[derive(Debug)]
struct Inner {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    compression_level: Option<i32>,
    cancel_token: CancellationToken,
}

/// A single logs intake endpoint.
#[derive(Debug, Clone)]
pub struct HttpDestination {
    inner: Arc<Inner>,
    /// Permits for in-flight [`Destination::send_async`] calls.
    inflight: Arc<Semaphore>,
}

impl HttpDestination {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        api_key: &str,
        config: &HttpDestinationConfig,
        cancel_token: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(api_key).map_err(|e| ConfigError::InvalidValue {
            key: "api_key".to_string(),
            value: "<redacted>".to_string(),
            reason: e.to_string(),
        })?;
        headers.insert("DD-API-KEY", api_key);
        headers.insert("DD-PROTOCOL", HeaderValue::from_static("agent-json"));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        if config.use_compression {
            headers.insert("Content-Encoding", HeaderValue::from_static("zstd"));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                url: format!("{}/api/v2/logs", endpoint.trim_end_matches('/')),
                headers,
                compression_level: config
                    .use_compression
                    .then_some(config.compression_level),
                cancel_token,
            }),
            inflight: Arc::new(Semaphore::new(constants::DEFAULT_MAX_INFLIGHT_ASYNC_SENDS)),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl Inner {
    async fn send(&self, payload: Bytes) -> Result<(), DestinationError> {
        if self.cancel_token.is_cancelled() {
            return Err(DestinationError::Canceled);
        }

        let body = self.compress(payload);
        let request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body);

        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => Err(DestinationError::Canceled),
            resp = request.send() => match resp {
                Ok(resp) => classify(resp.status()),
                Err(e) => Err(DestinationError::Retryable(e.to_string())),
            },
        }
    }

    fn compress(&self, data: Bytes) -> Bytes {
        let Some(level) = self.compression_level else {
            return data;
        };
        match encode(&data, level) {
            Ok(compressed) => Bytes::from(compressed),
            Err(e) => {
                debug!("LOGS | Failed to compress data: {}", e);
                data
            }
        }
    }
}

fn encode(data: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    encoder.finish()
}

fn classify(status: StatusCode) -> Result<(), DestinationError> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return Err(DestinationError::Retryable(status.to_string()));
    }
    if status == StatusCode::FORBIDDEN {
        error!("LOGS | Request was denied by Datadog: Access denied. Please verify that your API key is valid.");
    }
    Err(DestinationError::Terminal(status.to_string()))
}

#[async_trait]
impl Destination for HttpDestination {
    async fn send(&self, payload: Bytes) -> Result<(), DestinationError> {
        self.inner.send(payload).await
    }

    fn send_async(&self, payload: Bytes) {
        let Ok(permit) = Arc::clone(&self.inflight).try_acquire_owned() else {
            debug!(
                "LOGS | Too many pending sends to {}, dropping payload",
                self.inner.url
            );
            return;
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = inner.send(payload).await {
                debug!("LOGS | Failed to send payload to {}: {}", inner.url, e);
            }
        });
    }
}
