// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Datadog Logs Sender
//!
//! The last stage of the logs pipeline: records produced upstream are
//! accumulated into payloads, delivered reliably to a primary intake and
//! mirrored best-effort to any additional intakes, then handed back to the
//! next stage (typically an auditor) once they are considered sent.
//!
//! ```text
//!   input (mpsc)            ┌──────────────┐           output (mpsc)
//!  ─────────────────────▶  │    Sender    │  ─────────────────────▶
//!                          │  (one task)  │
//!                          └──────┬───────┘
//!                                 │ Payload (Batch | Stream)
//!                                 v
//!                          ┌──────────────┐   send (retry forever)
//!                          │    Fanout    │ ─────────────────▶ primary
//!                          └──────────────┘ ─ ─ send_async ─ ▶ additionals
//! ```
//!
//! - [`payload`]: accumulation strategies and the idle flush timer
//! - [`formatter`]: line and array encodings of a batch
//! - [`destination`]: the destination capability and its error classes
//! - [`fanout`]: primary retry loop and additional-destination mirroring
//! - [`sender`]: the dispatch loop tying everything together
//! - [`http`]: a `reqwest` based destination for the Datadog logs intake

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod destination;
pub mod error;
pub mod fanout;
pub mod formatter;
pub mod http;
pub mod message;
pub mod metrics;
pub mod payload;
pub mod sender;

pub use destination::{Destination, DestinationError, Destinations};
pub use message::Record;
pub use sender::{Sender, SenderHandle};
