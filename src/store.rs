// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// In-memory recording sink.
//
// Materializes the event stream into per-connection records: status,
// the ordered append-only message list, and counts. This is what a
// panel-style consumer reads; the store holds everything in memory and
// persists nothing.

use crate::message::{ConnectionId, ConnectionStatus, Message, TransportKind};
use crate::sink::{EventSink, StreamEvent};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Everything recorded about one observed connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRecord {
    #[serde(rename = "connectionId")]
    pub id: ConnectionId,
    pub url: String,
    pub source: TransportKind,
    pub status: ConnectionStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Ordered by `sequence_id`; append-only.
    pub messages: Vec<Message>,
    /// Detail of the error event, when status is `Error`.
    pub error: Option<String>,
}

/// Concurrent store of connection records, fed by the event stream.
///
/// Connections live until the host explicitly clears them; there is no
/// TTL. Events for connections the store never saw created (cleared
/// mid-stream) are dropped.
#[derive(Default)]
pub struct ConnectionStore {
    connections: DashMap<ConnectionId, ConnectionRecord>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionRecord> {
        self.connections.get(id).map(|r| r.value().clone())
    }

    /// Snapshot of every record, oldest first.
    pub fn all(&self) -> Vec<ConnectionRecord> {
        let mut records: Vec<ConnectionRecord> =
            self.connections.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn message_count(&self, id: &ConnectionId) -> usize {
        self.connections
            .get(id)
            .map(|r| r.messages.len())
            .unwrap_or(0)
    }

    pub fn total_messages(&self) -> usize {
        self.connections.iter().map(|r| r.messages.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every record. The host's explicit clear-all.
    pub fn clear(&self) {
        self.connections.clear();
    }
}

impl EventSink for ConnectionStore {
    fn emit(&self, event: StreamEvent) {
        match event {
            StreamEvent::ConnectionCreated {
                connection_id,
                url,
                source,
                timestamp,
            } => {
                self.connections.insert(
                    connection_id.clone(),
                    ConnectionRecord {
                        id: connection_id,
                        url,
                        source,
                        status: ConnectionStatus::Connecting,
                        created_at: timestamp,
                        messages: Vec::new(),
                        error: None,
                    },
                );
            }
            StreamEvent::Opened { connection_id, .. } => {
                if let Some(mut record) = self.connections.get_mut(&connection_id) {
                    record.status = ConnectionStatus::Open;
                }
            }
            StreamEvent::Message { message } => {
                if let Some(mut record) = self.connections.get_mut(&message.connection_id) {
                    record.messages.push(message);
                }
            }
            StreamEvent::Errored {
                connection_id,
                error,
                ..
            } => {
                if let Some(mut record) = self.connections.get_mut(&connection_id) {
                    record.status = ConnectionStatus::Error;
                    record.error = Some(error);
                }
            }
            StreamEvent::Closed { connection_id, .. } => {
                if let Some(mut record) = self.connections.get_mut(&connection_id) {
                    record.status = ConnectionStatus::Closed;
                }
            }
        }
    }
}
