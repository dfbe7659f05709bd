// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default limits for the logs sender.
//!
//! These are the values used when no override is configured. They are fixed
//! for the lifetime of a sender.

use std::time::Duration;

/// Maximum number of records held in one batch before it is flushed.
pub const DEFAULT_BATCH_MAX_SIZE: usize = 20;

/// Maximum cumulative content size, in bytes, of the records in one batch.
///
/// Only record contents are counted; the framing added by the formatter
/// (brackets, separators, newlines) is not.
pub const DEFAULT_BATCH_MAX_CONTENT_SIZE: usize = 1_000_000;

/// Time after the last flush at which a non-empty batch is flushed anyway.
pub const DEFAULT_BATCH_WAIT: Duration = Duration::from_secs(5);

/// Number of concurrent fire-and-forget sends allowed per additional
/// destination. Payloads beyond this are dropped.
pub const DEFAULT_MAX_INFLIGHT_ASYNC_SENDS: usize = 100;

/// Default logs intake used when no URL is configured.
pub const DEFAULT_LOGS_DD_URL: &str = "https://http-intake.logs.datadoghq.com";

/// Default request timeout, in seconds, for a single HTTP send.
pub const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 30;

/// Default zstd level used when compression is enabled.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;
