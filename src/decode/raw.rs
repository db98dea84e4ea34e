// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Raw (unframed) decoder.
//
// For generic streams that are neither SSE nor NDJSON, observed by a
// progressive-text transport: every non-empty chunk is one frame, and
// nothing is ever buffered.

use super::FrameDecoder;
use crate::message::RawFrame;

/// Chunk-per-frame decoder for unframed streams.
pub struct RawDecoder;

impl FrameDecoder for RawDecoder {
    fn consume(&self, buffer: &mut String) -> Vec<RawFrame> {
        if buffer.is_empty() {
            return Vec::new();
        }
        vec![RawFrame::data_only(std::mem::take(buffer))]
    }

    fn finish(&self, buffer: String) -> Vec<RawFrame> {
        // consume() drains on every chunk; a closed source leaves nothing.
        if buffer.is_empty() {
            Vec::new()
        } else {
            vec![RawFrame::data_only(buffer)]
        }
    }
}
