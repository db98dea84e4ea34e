// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Per-connection decoding sessions and the session registry.
//
// A session owns one connection's lifecycle: its decode buffer, its
// message counter, and its status transitions. Chunks for a connection
// arrive strictly in delivery order from one upstream source and are
// processed to completion before the next; distinct connections are
// fully independent.
//
// The registry replaces any notion of process-wide interception
// globals: it is an explicitly constructed object, so independent
// instances (one per test, one per proxy) never interfere.

use crate::decode::decoder_for;
use crate::message::{
    ConnectionId, ConnectionStatus, DecodeKind, Message, RawFrame, TransportKind,
};
use crate::sink::{EventSink, StreamEvent};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

/// Hard cap on undecoded buffer growth.
///
/// Memory use is normally proportional to the largest single incomplete
/// frame; this bounds a stream that never produces a frame boundary.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 8 * 1024 * 1024;

// ---------------------------------------------------------------------------
// StreamSession
// ---------------------------------------------------------------------------

/// Live decoding state for one connection, from detection to a
/// terminal status.
pub struct StreamSession {
    id: ConnectionId,
    url: String,
    transport: TransportKind,
    decode_kind: DecodeKind,
    status: ConnectionStatus,
    /// Not-yet-framed text. Owned exclusively by this session.
    buffer: String,
    /// Count of messages emitted so far; the next message gets this + 1.
    sequence: u64,
    sink: Arc<dyn EventSink>,
    max_buffer_bytes: usize,
}

impl StreamSession {
    /// Create a session in `Connecting` state and announce the
    /// connection. The id is assigned here, before any message can
    /// reference it.
    pub fn new(
        id: ConnectionId,
        url: impl Into<String>,
        transport: TransportKind,
        decode_kind: DecodeKind,
        sink: Arc<dyn EventSink>,
        max_buffer_bytes: usize,
    ) -> Self {
        let url = url.into();
        tracing::info!(id = %id, url = %url, source = %transport, "stream connection detected");
        sink.emit(StreamEvent::ConnectionCreated {
            connection_id: id.clone(),
            url: url.clone(),
            source: transport,
            timestamp: Utc::now(),
        });
        Self {
            id,
            url,
            transport,
            decode_kind,
            status: ConnectionStatus::Connecting,
            buffer: String::new(),
            sequence: 0,
            sink,
            max_buffer_bytes,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Append a chunk and emit every frame it completes, in order.
    ///
    /// Chunks delivered after a terminal state are dropped silently: a
    /// race between an adapter's cancellation and a final trickle of
    /// data is expected and benign.
    pub fn feed(&mut self, chunk: &str) -> Vec<Message> {
        if self.status.is_terminal() {
            tracing::trace!(id = %self.id, "chunk after terminal state dropped");
            return Vec::new();
        }

        self.buffer.push_str(chunk);
        if self.buffer.len() > self.max_buffer_bytes {
            let detail = format!(
                "decode buffer exceeded {} bytes without a frame boundary",
                self.max_buffer_bytes
            );
            tracing::warn!(id = %self.id, "{detail}");
            self.fail(detail);
            return Vec::new();
        }

        let frames = decoder_for(self.decode_kind).consume(&mut self.buffer);
        self.emit_frames(frames)
    }

    /// Transport-level open signal: `Connecting -> Open`.
    pub fn open(&mut self) {
        if self.status != ConnectionStatus::Connecting {
            return;
        }
        self.status = ConnectionStatus::Open;
        tracing::debug!(id = %self.id, "stream open");
        self.sink.emit(StreamEvent::Opened {
            connection_id: self.id.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Graceful end of stream: flush the remainder through the
    /// decoder's end-of-stream path, then transition to `Closed`.
    ///
    /// Cancellation maps here too; an unterminated fragment never emits
    /// from the flush, so there is nothing extra to discard.
    pub fn close(&mut self) -> Vec<Message> {
        if self.status.is_terminal() {
            return Vec::new();
        }
        let remainder = std::mem::take(&mut self.buffer);
        let frames = decoder_for(self.decode_kind).finish(remainder);
        let flushed = self.emit_frames(frames);

        self.status = ConnectionStatus::Closed;
        tracing::info!(id = %self.id, messages = self.sequence, "stream closed");
        self.sink.emit(StreamEvent::Closed {
            connection_id: self.id.clone(),
            timestamp: Utc::now(),
        });
        flushed
    }

    /// Transport failure: transition to `Error` from any non-terminal
    /// state. Buffered undecoded text is discarded, never flushed: a
    /// half-written frame at failure carries no reliable meaning.
    pub fn error(&mut self, detail: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        let detail = detail.into();
        tracing::info!(id = %self.id, error = %detail, "stream errored");
        self.fail(detail);
    }

    fn fail(&mut self, detail: String) {
        self.buffer.clear();
        self.status = ConnectionStatus::Error;
        self.sink.emit(StreamEvent::Errored {
            connection_id: self.id.clone(),
            error: detail,
            timestamp: Utc::now(),
        });
    }

    /// Stamp, number, and emit frames one at a time, strictly in order.
    /// Each message reaches the sink before the next frame is touched.
    fn emit_frames(&mut self, frames: Vec<RawFrame>) -> Vec<Message> {
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            self.sequence += 1;
            let message = Message::from_frame(self.id.clone(), self.sequence, frame);
            self.sink.emit(StreamEvent::Message {
                message: message.clone(),
            });
            out.push(message);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Owns every live session and routes adapter calls by connection id.
///
/// Backed by `DashMap` so transports for distinct connections may call
/// in from any task without coordination; each session itself is only
/// ever driven by its one upstream source.
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, StreamSession>,
    sink: Arc<dyn EventSink>,
    max_buffer_bytes: usize,
}

impl SessionRegistry {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_max_buffer_bytes(sink, DEFAULT_MAX_BUFFER_BYTES)
    }

    pub fn with_max_buffer_bytes(sink: Arc<dyn EventSink>, max_buffer_bytes: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            sink,
            max_buffer_bytes,
        }
    }

    /// Register a newly detected connection and announce it.
    ///
    /// The returned id is the handle for every subsequent feed and
    /// lifecycle call.
    pub fn create_session(
        &self,
        url: impl Into<String>,
        transport: TransportKind,
        decode_kind: DecodeKind,
    ) -> ConnectionId {
        let id = ConnectionId::generate();
        let session = StreamSession::new(
            id.clone(),
            url,
            transport,
            decode_kind,
            Arc::clone(&self.sink),
            self.max_buffer_bytes,
        );
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Feed one chunk to a connection. Returns the messages the chunk
    /// completed (they are also emitted to the sink as a side effect).
    pub fn feed(&self, id: &ConnectionId, chunk: &str) -> Vec<Message> {
        match self.sessions.get_mut(id) {
            Some(mut session) => session.feed(chunk),
            None => {
                tracing::warn!(id = %id, "feed for unknown connection");
                Vec::new()
            }
        }
    }

    pub fn signal_open(&self, id: &ConnectionId) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.open();
        }
    }

    /// Graceful end of stream. Returns any messages flushed from the
    /// decoder's end-of-stream path.
    pub fn signal_close(&self, id: &ConnectionId) -> Vec<Message> {
        match self.sessions.get_mut(id) {
            Some(mut session) => session.close(),
            None => Vec::new(),
        }
    }

    pub fn signal_error(&self, id: &ConnectionId, detail: impl Into<String>) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.error(detail);
        }
    }

    pub fn status(&self, id: &ConnectionId) -> Option<ConnectionStatus> {
        self.sessions.get(id).map(|s| s.status())
    }

    /// Drop every session. The explicit clear-all operation; sessions
    /// have no TTL.
    pub fn clear(&self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn registry() -> (SessionRegistry, UnboundedReceiver<StreamEvent>) {
        let (sink, rx) = ChannelSink::new();
        (SessionRegistry::new(Arc::new(sink)), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    #[test]
    fn create_emits_connection_event_first() {
        let (registry, mut rx) = registry();
        let id = registry.create_session(
            "https://example.com/events",
            TransportKind::FetchSse,
            DecodeKind::Sse,
        );

        assert_eq!(registry.status(&id), Some(ConnectionStatus::Connecting));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::ConnectionCreated {
                connection_id,
                url,
                source,
                ..
            } => {
                assert_eq!(connection_id, &id);
                assert_eq!(url, "https://example.com/events");
                assert_eq!(*source, TransportKind::FetchSse);
            }
            other => panic!("expected connection event, got {other:?}"),
        }
    }

    #[test]
    fn open_transitions_once() {
        let (registry, mut rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchSse, DecodeKind::Sse);
        drain(&mut rx);

        registry.signal_open(&id);
        assert_eq!(registry.status(&id), Some(ConnectionStatus::Open));

        // A second open signal is a no-op and emits nothing further.
        registry.signal_open(&id);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Opened { .. }));
    }

    #[test]
    fn close_is_terminal() {
        let (registry, mut rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchSse, DecodeKind::Sse);
        registry.signal_open(&id);
        registry.signal_close(&id);
        assert_eq!(registry.status(&id), Some(ConnectionStatus::Closed));

        // No transition out of a terminal state.
        registry.signal_open(&id);
        registry.signal_error(&id, "late failure");
        assert_eq!(registry.status(&id), Some(ConnectionStatus::Closed));

        drain(&mut rx);
    }

    #[test]
    fn error_from_connecting_is_allowed() {
        let (registry, mut rx) = registry();
        let id = registry.create_session("u", TransportKind::XhrSse, DecodeKind::Sse);
        registry.signal_error(&id, "dns failure");
        assert_eq!(registry.status(&id), Some(ConnectionStatus::Error));

        let events = drain(&mut rx);
        match events.last().unwrap() {
            StreamEvent::Errored { error, .. } => assert_eq!(error, "dns failure"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------
    // Feeding and sequencing
    // ---------------------------------------------------------------

    #[test]
    fn sequence_ids_are_gapless_from_one() {
        let (registry, _rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchNdjson, DecodeKind::Ndjson);
        registry.signal_open(&id);

        let mut all = Vec::new();
        all.extend(registry.feed(&id, "{\"n\":1}\n{\"n\":2}\n"));
        all.extend(registry.feed(&id, "{\"n\":3}\n"));
        all.extend(registry.signal_close(&id));

        let seqs: Vec<u64> = all.iter().map(|m| m.sequence_id).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn partial_frame_spans_feeds() {
        let (registry, _rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchSse, DecodeKind::Sse);
        registry.signal_open(&id);

        assert!(registry.feed(&id, "data: line1\ndata: lin").is_empty());
        let messages = registry.feed(&id, "e2\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "line1\nline2");
        assert_eq!(messages[0].event_type, "message");
    }

    #[test]
    fn messages_reach_sink_in_emission_order() {
        let (registry, mut rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchSse, DecodeKind::Sse);
        drain(&mut rx);

        let returned = registry.feed(&id, "data: a\n\ndata: b\n\ndata: c\n\n");
        assert_eq!(returned.len(), 3);

        let sunk: Vec<Message> = drain(&mut rx)
            .into_iter()
            .map(|e| match e {
                StreamEvent::Message { message } => message,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(sunk, returned);
    }

    #[test]
    fn sse_event_type_and_id_carried() {
        // A native EventSource client is still SSE on the wire.
        let (registry, _rx) = registry();
        let id = registry.create_session("u", TransportKind::NativeEventSource, DecodeKind::Sse);
        let messages = registry.feed(&id, "event: ping\nid: 7\ndata: hello\n\n");
        assert_eq!(messages[0].event_type, "ping");
        assert_eq!(messages[0].last_event_id, "7");
        assert_eq!(messages[0].data, "hello");
    }

    // ---------------------------------------------------------------
    // End-of-stream flushing
    // ---------------------------------------------------------------

    #[test]
    fn close_flushes_ndjson_tail() {
        let (registry, _rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchNdjson, DecodeKind::Ndjson);
        assert!(registry.feed(&id, "{\"a\":1}").is_empty());

        let flushed = registry.signal_close(&id);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].data, "{\"a\":1}");
    }

    #[test]
    fn close_discards_cut_off_sse_fragment() {
        let (registry, mut rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchSse, DecodeKind::Sse);
        drain(&mut rx);

        assert!(registry.feed(&id, "data: partial").is_empty());
        let flushed = registry.signal_close(&id);
        assert!(flushed.is_empty());

        // Only the close event, no message events.
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Closed { .. }));
    }

    #[test]
    fn error_discards_buffered_fragment() {
        let (registry, mut rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchSse, DecodeKind::Sse);
        drain(&mut rx);

        registry.feed(&id, "data: half-writ");
        registry.signal_error(&id, "connection reset");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Errored { .. }));
    }

    // ---------------------------------------------------------------
    // Terminal-state feeding
    // ---------------------------------------------------------------

    #[test]
    fn feed_after_close_is_noop() {
        let (registry, mut rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchSse, DecodeKind::Sse);
        registry.signal_close(&id);
        drain(&mut rx);

        let messages = registry.feed(&id, "data: late\n\n");
        assert!(messages.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn feed_after_error_is_noop() {
        let (registry, mut rx) = registry();
        let id = registry.create_session("u", TransportKind::FetchNdjson, DecodeKind::Ndjson);
        registry.signal_error(&id, "aborted");
        drain(&mut rx);

        assert!(registry.feed(&id, "{\"late\":true}\n").is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn feed_for_unknown_connection_is_noop() {
        let (registry, _rx) = registry();
        let unknown = ConnectionId::from("nope");
        assert!(registry.feed(&unknown, "data: x\n\n").is_empty());
        assert!(registry.signal_close(&unknown).is_empty());
    }

    // ---------------------------------------------------------------
    // Buffer bounding
    // ---------------------------------------------------------------

    #[test]
    fn oversized_unframed_buffer_errors_the_session() {
        let (sink, mut rx) = ChannelSink::new();
        let registry = SessionRegistry::with_max_buffer_bytes(Arc::new(sink), 64);
        let id = registry.create_session("u", TransportKind::FetchSse, DecodeKind::Sse);
        drain(&mut rx);

        // No frame boundary anywhere; the cap must trip.
        let messages = registry.feed(&id, &"x".repeat(128));
        assert!(messages.is_empty());
        assert_eq!(registry.status(&id), Some(ConnectionStatus::Error));

        let events = drain(&mut rx);
        match events.last().unwrap() {
            StreamEvent::Errored { error, .. } => {
                assert!(error.contains("exceeded"), "got: {error}");
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------
    // Registry behavior
    // ---------------------------------------------------------------

    #[test]
    fn connections_are_independent() {
        let (registry, _rx) = registry();
        let a = registry.create_session("a", TransportKind::FetchSse, DecodeKind::Sse);
        let b = registry.create_session("b", TransportKind::FetchNdjson, DecodeKind::Ndjson);

        // Interleaved feeds keep separate buffers and counters.
        registry.feed(&a, "data: a1\n\n");
        registry.feed(&b, "{\"b\":1}\n");
        let a2 = registry.feed(&a, "data: a2\n\n");
        let b2 = registry.feed(&b, "{\"b\":2}\n");

        assert_eq!(a2[0].sequence_id, 2);
        assert_eq!(b2[0].sequence_id, 2);
        assert_eq!(a2[0].connection_id, a);
        assert_eq!(b2[0].connection_id, b);
    }

    #[test]
    fn clear_drops_all_sessions() {
        let (registry, _rx) = registry();
        registry.create_session("a", TransportKind::FetchSse, DecodeKind::Sse);
        registry.create_session("b", TransportKind::FetchSse, DecodeKind::Sse);
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn independent_registries_do_not_interfere() {
        let (first, _rx1) = registry();
        let (second, mut rx2) = registry();

        let id = first.create_session("a", TransportKind::FetchSse, DecodeKind::Sse);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());

        // The second registry's sink saw nothing from the first.
        assert!(drain(&mut rx2).is_empty());
        assert!(second.feed(&id, "data: x\n\n").is_empty());
    }
}
