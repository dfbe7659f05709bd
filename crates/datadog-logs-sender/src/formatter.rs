// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Encodings of a batch of records into a single payload.
//!
//! Neither encoding escapes or validates record contents. Producers feeding
//! an [`Formatter::Array`] sender are expected to emit contents that are
//! already valid array elements (pre-serialized JSON objects).
//!
//! ```text
//! Line:   a\nb\nc\n
//! Array:  [a,b,c]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::message::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Formatter {
    /// Each content followed by a newline.
    Line,
    /// Contents joined by commas and wrapped in brackets.
    #[default]
    Array,
}

impl Formatter {
    #[must_use]
    pub fn format(&self, records: &[Record]) -> Bytes {
        let content_size: usize = records.iter().map(Record::content_size).sum();
        match self {
            Formatter::Line => {
                let mut buffer = BytesMut::with_capacity(content_size + records.len());
                for record in records {
                    buffer.put_slice(record.content());
                    buffer.put_u8(b'\n');
                }
                buffer.freeze()
            }
            Formatter::Array => {
                let mut buffer = BytesMut::with_capacity(content_size + records.len() + 2);
                buffer.put_u8(b'[');
                for (i, record) in records.iter().enumerate() {
                    if i > 0 {
                        buffer.put_u8(b',');
                    }
                    buffer.put_slice(record.content());
                }
                buffer.put_u8(b']');
                buffer.freeze()
            }
        }
    }
}

impl std::str::FromStr for Formatter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "line" => Ok(Formatter::Line),
            "array" => Ok(Formatter::Array),
            other => Err(format!("unknown format '{other}', expected 'line' or 'array'")),
        }
    }
}
