// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Newline-delimited JSON decoder.
//
// A frame boundary is any `\n`. Lines are not field-parsed: the frame
// data is the line verbatim, with the terminating newline stripped.

use super::FrameDecoder;
use crate::message::RawFrame;

/// Incremental NDJSON frame decoder.
pub struct NdjsonDecoder;

impl FrameDecoder for NdjsonDecoder {
    /// Every terminated line becomes one frame, provided it is
    /// non-empty after trimming; blank separator lines are skipped
    /// silently. The unterminated tail stays in the buffer regardless
    /// of its content.
    fn consume(&self, buffer: &mut String) -> Vec<RawFrame> {
        let Some(boundary) = buffer.rfind('\n') else {
            return Vec::new();
        };
        let complete = buffer[..boundary].to_string();
        *buffer = buffer[boundary + 1..].to_string();
        frames_from_lines(&complete)
    }

    /// A closed source's leftover line is complete by definition: it is
    /// emitted as one final frame when non-empty after trimming.
    fn finish(&self, buffer: String) -> Vec<RawFrame> {
        frames_from_lines(&buffer)
    }
}

fn frames_from_lines(text: &str) -> Vec<RawFrame> {
    text.split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(RawFrame::data_only)
        .collect()
}
