// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Transport adapters.
//
// Adapters produce ordered chunks and lifecycle calls for one
// connection and forward them into a session. Two shapes:
//
// - `BodyStreamTap`: wraps a chunked byte stream (an HTTP response
//   body). Every chunk is passed through to the downstream consumer
//   unmodified and undelayed; decoding happens after the chunk has
//   been handed off.
// - `ProgressiveText`: consumes cumulative response-text snapshots (a
//   transport that re-presents the whole body so far on each progress
//   callback) and feeds only the unseen suffix.

use crate::message::ConnectionId;
use crate::session::SessionRegistry;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result item of an observed byte stream.
pub type ChunkResult = Result<Bytes, BoxError>;

// ---------------------------------------------------------------------------
// BodyStreamTap
// ---------------------------------------------------------------------------

/// Observes a chunked byte stream while passing it through.
pub struct BodyStreamTap {
    registry: Arc<SessionRegistry>,
    channel_capacity: usize,
}

impl BodyStreamTap {
    pub fn new(registry: Arc<SessionRegistry>, channel_capacity: usize) -> Self {
        Self {
            registry,
            channel_capacity,
        }
    }

    /// Tee `input` through to the returned stream, feeding each chunk
    /// to the session for `id` after it has been forwarded.
    ///
    /// End of input signals close; a stream error signals error (after
    /// the error itself has been forwarded); a downstream consumer that
    /// goes away is a cancellation and also signals close.
    pub fn observe(
        &self,
        id: ConnectionId,
        mut input: impl Stream<Item = ChunkResult> + Unpin + Send + 'static,
    ) -> ReceiverStream<ChunkResult> {
        let registry = Arc::clone(&self.registry);
        let (tx, rx) = mpsc::channel::<ChunkResult>(self.channel_capacity);

        tokio::spawn(async move {
            while let Some(next) = input.next().await {
                match next {
                    Ok(chunk) => {
                        // The real consumer gets the original bytes
                        // first; observation never sits between it and
                        // the network.
                        if tx.send(Ok(chunk.clone())).await.is_err() {
                            tracing::debug!(id = %id, "downstream consumer gone, cancelling");
                            registry.signal_close(&id);
                            return;
                        }
                        let text = String::from_utf8_lossy(&chunk);
                        registry.feed(&id, &text);
                    }
                    Err(error) => {
                        let detail = error.to_string();
                        let _ = tx.send(Err(error)).await;
                        registry.signal_error(&id, detail);
                        return;
                    }
                }
            }
            registry.signal_close(&id);
        });

        ReceiverStream::new(rx)
    }
}

// ---------------------------------------------------------------------------
// ProgressiveText
// ---------------------------------------------------------------------------

/// Adapter for transports that expose the response as a growing text
/// snapshot rather than discrete chunks.
///
/// Each `snapshot` call receives the entire body seen so far; only the
/// suffix past the previously seen length is fed to the session.
/// Snapshots grow append-only, so the previous length always falls on
/// a character boundary.
pub struct ProgressiveText {
    registry: Arc<SessionRegistry>,
    id: ConnectionId,
    seen: usize,
}

impl ProgressiveText {
    pub fn new(registry: Arc<SessionRegistry>, id: ConnectionId) -> Self {
        Self {
            registry,
            id,
            seen: 0,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    /// Feed the unseen suffix of the cumulative body text, if any.
    pub fn snapshot(&mut self, text: &str) {
        if text.len() <= self.seen {
            return;
        }
        let Some(new_data) = text.get(self.seen..) else {
            return;
        };
        self.seen = text.len();
        self.registry.feed(&self.id, new_data);
    }

    /// The transport finished delivering the body.
    pub fn complete(self) {
        self.registry.signal_close(&self.id);
    }

    /// The transport failed.
    pub fn fail(self, detail: impl Into<String>) {
        self.registry.signal_error(&self.id, detail);
    }
}
