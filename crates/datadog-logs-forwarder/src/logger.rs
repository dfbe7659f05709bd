// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatting for the forwarder.
//!
//! ```text
//! DD_LOGS_FORWARDER | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! The forwarder usually shares stdout/stderr with the process whose logs it
//! ships, so every line carries a fixed prefix that is easy to filter out.

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const PREFIX: &str = "DD_LOGS_FORWARDER";

/// Crates whose logs are never useful at the forwarder level.
const SILENCED: &str = "h2=off,hyper=off,rustls=off,reqwest=off";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{PREFIX} | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Filter directives for the given `DD_LOG_LEVEL` value.
pub fn env_filter(log_level: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    EnvFilter::try_new(format!("{SILENCED},{}", log_level.to_lowercase()))
}

/// Installs the global subscriber. Logs go to stderr so that stdout stays
/// free for the producer piping into the forwarder.
pub fn init(log_level: &str) -> Result<(), String> {
    let filter = env_filter(log_level).map_err(|e| format!("invalid log level: {e}"))?;
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("setting default subscriber failed: {e}"))
}
