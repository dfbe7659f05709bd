// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The unit of work flowing through the sender.

use bytes::Bytes;

/// Where a record was read from. Carried through untouched so the next stage
/// (usually the auditor) can persist the position once the record is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    /// Identifier of the source, e.g. `file:/var/log/app.log`.
    pub identifier: String,
    /// Position of the record inside the source.
    pub offset: String,
}

/// A single log record.
///
/// The content is an already encoded, opaque byte payload: the sender never
/// inspects or escapes it. Metadata is not interpreted either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    content: Bytes,
    origin: Option<Origin>,
    tags: Vec<String>,
}

impl Record {
    #[must_use]
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            origin: None,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Size of the content in bytes, as counted against batch limits.
    #[must_use]
    pub fn content_size(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}
