//! Newline-agnostic JSON frame decoding
//!
//! OVSDB peers write JSON objects back to back; some terminate them with a
//! newline, some don't. The decoder buffers raw bytes and yields each
//! complete JSON value as soon as it is available.

use serde_json::Value;

use crate::error::{JsonRpcError, Result};

/// Incremental decoder for a stream of concatenated JSON values.
///
/// Bytes are scanned once: bracket depth and string state survive across
/// `extend` calls, and `serde_json` only sees a frame once its outermost
/// bracket has closed.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    /// Bytes of the current frame already scanned
    scanned: usize,
    /// Open brackets; zero between frames
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
            scanned: 0,
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    /// Append bytes read from the connection
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame.
    ///
    /// `Ok(None)` means more input is needed. Syntax errors, values that are
    /// not objects or arrays, and frames that outgrow `max_frame_bytes` are
    /// protocol violations.
    pub fn next_frame(&mut self) -> Result<Option<Value>> {
        if self.depth == 0 {
            let Some(start) = self.buffer.iter().position(|b| !b.is_ascii_whitespace()) else {
                self.buffer.clear();
                return Ok(None);
            };
            self.buffer.drain(..start);

            match self.buffer[0] {
                b'{' | b'[' => {
                    self.depth = 1;
                    self.scanned = 1;
                }
                other => {
                    return Err(JsonRpcError::protocol(format!(
                        "frame starts with {:?}, not an object",
                        char::from(other)
                    )))
                }
            }
        }

        let mut end = None;
        for (offset, &byte) in self.buffer[self.scanned..].iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        end = Some(self.scanned + offset + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(end) = end else {
            self.scanned = self.buffer.len();
            if self.scanned > self.max_frame_bytes {
                return Err(self.oversized());
            }
            return Ok(None);
        };
        self.scanned = 0;
        if end > self.max_frame_bytes {
            return Err(self.oversized());
        }

        let frame = serde_json::from_slice(&self.buffer[..end])
            .map_err(|e| JsonRpcError::protocol(format!("malformed JSON: {}", e)))?;
        self.buffer.drain(..end);
        Ok(Some(frame))
    }

    fn oversized(&self) -> JsonRpcError {
        JsonRpcError::protocol(format!("frame exceeds {} bytes", self.max_frame_bytes))
    }
}
