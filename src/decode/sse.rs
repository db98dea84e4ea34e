// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Server-Sent Events decoder.
//
// A frame is a block of `field: value` lines terminated by a blank
// line. A single newline never terminates a frame: one payload may span
// several `data:` lines, which are newline-joined.

use super::FrameDecoder;
use crate::message::RawFrame;

/// Incremental SSE frame decoder.
pub struct SseDecoder;

impl FrameDecoder for SseDecoder {
    /// Flush at the **last** blank-line boundary in the buffer.
    ///
    /// Everything up to and including that boundary is complete and may
    /// hold several frames; they are parsed in order. Everything after
    /// it stays in the buffer, so no frame is parsed twice and no
    /// partial frame is parsed early.
    fn consume(&self, buffer: &mut String) -> Vec<RawFrame> {
        let Some(boundary) = buffer.rfind("\n\n") else {
            return Vec::new();
        };
        let complete = buffer[..boundary + 2].to_string();
        *buffer = buffer[boundary + 2..].to_string();
        parse_frames(&complete)
    }

    /// Decode the leftover buffer of a closed source.
    ///
    /// Only blocks whose final line was newline-terminated emit: a
    /// trailing fragment cut off mid-line carries no reliable meaning
    /// and is discarded.
    fn finish(&self, buffer: String) -> Vec<RawFrame> {
        if buffer.trim().is_empty() {
            return Vec::new();
        }
        parse_frames(&buffer)
    }
}

/// Parse a run of SSE lines into frames.
///
/// Field handling per line:
/// - `data:` strips the prefix and at most one following space, then
///   appends to the frame's data, joining multiple lines with `\n`
/// - `event:` / `id:` set their field, last occurrence wins
/// - comments (`:`), `retry:`, and unknown fields are ignored
/// - a blank line ends the frame; it emits only if data is non-empty
///   (pure comment or retry-only blocks produce nothing)
fn parse_frames(text: &str) -> Vec<RawFrame> {
    let mut frames = Vec::new();
    let mut data = String::new();
    let mut event: Option<String> = None;
    let mut id: Option<String> = None;

    for line in text.split('\n') {
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest);
        } else if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("id:") {
            id = Some(rest.trim().to_string());
        } else if line.is_empty() {
            if !data.is_empty() {
                frames.push(RawFrame {
                    data: std::mem::take(&mut data),
                    event: event.take(),
                    id: id.take(),
                });
            } else {
                // Frame boundary with nothing to emit; field state does
                // not leak into the next frame.
                event = None;
                id = None;
            }
        }
        // Anything else (comments, retry:, unknown fields) is ignored.
    }

    frames
}
