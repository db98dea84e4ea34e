// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Canonical types for observed stream traffic.
//
// These are the types all layers operate on: transport adapters create
// connections, frame decoders produce `RawFrame`s, and sessions turn
// frames into `Message`s that flow to the event sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Connection identity
// ---------------------------------------------------------------------------

/// Opaque identifier for one observed connection.
///
/// Generated once at detection time, before any lifecycle or message
/// event referencing the connection is emitted, and stable for the
/// connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh unique id.
    pub fn generate() -> Self {
        Self(format!("stream_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Transport and decode kinds
// ---------------------------------------------------------------------------

/// Which transport API a connection was observed on.
///
/// The wire labels match what downstream consumers of the event channel
/// already display for each source, so they are preserved verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "EventSource")]
    NativeEventSource,
    #[serde(rename = "fetch (SSE)")]
    FetchSse,
    #[serde(rename = "fetch (NDJSON)")]
    FetchNdjson,
    #[serde(rename = "XMLHttpRequest (SSE)")]
    XhrSse,
    #[serde(rename = "XMLHttpRequest (NDJSON)")]
    XhrNdjson,
    #[serde(rename = "XMLHttpRequest (Stream)")]
    XhrGeneric,
}

impl TransportKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransportKind::NativeEventSource => "EventSource",
            TransportKind::FetchSse => "fetch (SSE)",
            TransportKind::FetchNdjson => "fetch (NDJSON)",
            TransportKind::XhrSse => "XMLHttpRequest (SSE)",
            TransportKind::XhrNdjson => "XMLHttpRequest (NDJSON)",
            TransportKind::XhrGeneric => "XMLHttpRequest (Stream)",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which frame decoder a session drives.
///
/// Fixed at connection-open time; a stream's kind never changes
/// mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeKind {
    /// Server-Sent Events: blank-line-terminated field blocks.
    Sse,
    /// Newline-delimited JSON: one record per line.
    Ndjson,
    /// No framing: every observed chunk is one frame.
    Raw,
}

// ---------------------------------------------------------------------------
// Connection lifecycle status
// ---------------------------------------------------------------------------

/// Lifecycle state of a connection.
///
/// `Connecting -> Open -> {Closed | Error}`. Terminal states permit no
/// further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Closed | ConnectionStatus::Error)
    }
}

// ---------------------------------------------------------------------------
// Frames and messages
// ---------------------------------------------------------------------------

/// One complete protocol-level unit extracted from the raw stream,
/// prior to becoming a `Message`.
///
/// SSE frames may carry `event` and `id` fields; NDJSON and raw frames
/// carry data only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub data: String,
    pub event: Option<String>,
    pub id: Option<String>,
}

impl RawFrame {
    /// A frame with data only, as produced by the NDJSON and raw decoders.
    pub fn data_only(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            event: None,
            id: None,
        }
    }
}

/// Fallback event type for frames that carry none.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One decoded application-level event within a connection.
///
/// Immutable once constructed; append-only within the connection's
/// ordered message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "connectionId")]
    pub connection_id: ConnectionId,
    /// 1-based, strictly increasing per connection. Never reused,
    /// never skipped, never out of arrival order.
    #[serde(rename = "messageId")]
    pub sequence_id: u64,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: String,
    /// SSE `id:` field; empty when the frame supplied none.
    #[serde(rename = "lastEventId")]
    pub last_event_id: String,
    /// Capture instant, stamped when the frame completed decoding.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message from a completed frame.
    pub fn from_frame(connection_id: ConnectionId, sequence_id: u64, frame: RawFrame) -> Self {
        Self {
            connection_id,
            sequence_id,
            event_type: frame
                .event
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            data: frame.data,
            last_event_id: frame.id.unwrap_or_default(),
            timestamp: Utc::now(),
        }
    }

    /// Pretty-print the payload for display.
    ///
    /// JSON payloads are re-indented; anything else is returned verbatim.
    /// This is the full extent of payload interpretation the engine does.
    pub fn pretty_data(&self) -> String {
        match serde_json::from_str::<serde_json::Value>(&self.data) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| self.data.clone()),
            Err(_) => self.data.clone(),
        }
    }
}
