// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Stream-type classification.
//
// Performed once per response, before any session exists, from the
// resolved content-type. A response matching no marker is `None` and is
// never wrapped: it passes through the transport unmodified and
// generates no events. Kind is fixed at connection-open time.

use crate::message::{DecodeKind, TransportKind};

/// Content-type marker for Server-Sent Events.
pub const SSE_MARKER: &str = "text/event-stream";

/// Content-type markers for newline-delimited JSON.
pub const NDJSON_MARKERS: [&str; 2] = ["application/x-ndjson", "application/jsonlines"];

/// Classification of a response content-type.
///
/// A closed enum with a total-match fallback: "not a stream" is a
/// first-class outcome, not an implicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Sse,
    Ndjson,
    /// Matched no streaming marker; the response is not observed.
    None,
}

impl StreamKind {
    pub fn is_stream(&self) -> bool {
        !matches!(self, StreamKind::None)
    }

    /// The decoder a session for this kind drives, if any.
    pub fn decode_kind(&self) -> Option<DecodeKind> {
        match self {
            StreamKind::Sse => Some(DecodeKind::Sse),
            StreamKind::Ndjson => Some(DecodeKind::Ndjson),
            StreamKind::None => None,
        }
    }

    /// The transport label for a fetch-style (body stream) observation.
    pub fn fetch_transport(&self) -> Option<TransportKind> {
        match self {
            StreamKind::Sse => Some(TransportKind::FetchSse),
            StreamKind::Ndjson => Some(TransportKind::FetchNdjson),
            StreamKind::None => None,
        }
    }

    /// The transport label for a progressive-text (XHR-style) observation.
    pub fn xhr_transport(&self) -> Option<TransportKind> {
        match self {
            StreamKind::Sse => Some(TransportKind::XhrSse),
            StreamKind::Ndjson => Some(TransportKind::XhrNdjson),
            StreamKind::None => None,
        }
    }
}

/// Classify a content-type header value by substring match.
///
/// `application/jsonlines` classifies as NDJSON on every transport.
pub fn classify(content_type: &str) -> StreamKind {
    if content_type.contains(SSE_MARKER) {
        return StreamKind::Sse;
    }
    if NDJSON_MARKERS.iter().any(|m| content_type.contains(m)) {
        return StreamKind::Ndjson;
    }
    StreamKind::None
}
