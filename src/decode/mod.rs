// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Incremental frame decoders.
//
// Responsibilities:
// - Detect protocol framing boundaries live, on whatever chunk
//   boundaries the transport happens to deliver
// - Yield complete frames in arrival order, never a partial one
// - Leave unconsumed input in the buffer for the next call
// - Decode a closed source's leftover buffer exactly once, at the end
//
// Decoders are stateless; the per-connection decode buffer is owned by
// the session driving them.

mod ndjson;
mod raw;
mod sse;

pub use ndjson::NdjsonDecoder;
pub use raw::RawDecoder;
pub use sse::SseDecoder;

use crate::message::{DecodeKind, RawFrame};


/// Incremental decoder for one framing protocol.
///
/// `consume` is called repeatedly as chunks arrive: it extracts every
/// complete frame from the buffer and leaves the unconsumed tail in
/// place. No frame is parsed twice and no partial frame is parsed
/// early. `finish` is called exactly once, when the source has closed,
/// to decode whatever the final chunk left behind.
pub trait FrameDecoder: Send + Sync {
    fn consume(&self, buffer: &mut String) -> Vec<RawFrame>;

    fn finish(&self, buffer: String) -> Vec<RawFrame>;
}

/// The decoder instance for a given kind.
pub fn decoder_for(kind: DecodeKind) -> &'static dyn FrameDecoder {
    match kind {
        DecodeKind::Sse => &SseDecoder,
        DecodeKind::Ndjson => &NdjsonDecoder,
        DecodeKind::Raw => &RawDecoder,
    }
}
