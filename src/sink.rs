// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Event sink boundary.
//
// Sessions emit their ordered event sequence here; implementations
// relay it out of the interception context. Emission is fire-and-forget:
// nothing the decoder does depends on a sink return value, and a sink
// provides no acknowledgement or backpressure.

use crate::message::{ConnectionId, Message, TransportKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Event wire format
// ---------------------------------------------------------------------------

/// One lifecycle or message event on a connection.
///
/// The serialized shape (tag and field names) is the wire format a host
/// channel consumer sees, preserved from the interception protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A new connection was detected. Emitted exactly once, first.
    #[serde(rename = "stream-connection")]
    ConnectionCreated {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        url: String,
        source: TransportKind,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },

    /// The transport reported the connection open.
    #[serde(rename = "stream-open")]
    Opened {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },

    /// One decoded message.
    #[serde(rename = "stream-message")]
    Message {
        #[serde(flatten)]
        message: Message,
    },

    /// The transport failed; terminal.
    #[serde(rename = "stream-error")]
    Errored {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        error: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },

    /// The stream ended gracefully; terminal.
    #[serde(rename = "stream-close")]
    Closed {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
}

impl StreamEvent {
    /// The connection this event belongs to.
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            StreamEvent::ConnectionCreated { connection_id, .. }
            | StreamEvent::Opened { connection_id, .. }
            | StreamEvent::Errored { connection_id, .. }
            | StreamEvent::Closed { connection_id, .. } => connection_id,
            StreamEvent::Message { message } => &message.connection_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait: EventSink
// ---------------------------------------------------------------------------

/// Receives the ordered event sequence for all connections.
///
/// Implementations must tolerate a consumer that has gone away; a
/// session never blocks on, retries, or observes the outcome of an
/// emission.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Relays events onto a tokio channel, the host message channel analog.
///
/// A dropped receiver is tolerated silently; events emitted after that
/// point are discarded, matching the fire-and-forget contract.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }
}

/// Discards every event. For observers that only want pass-through.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StreamEvent) {}
}
