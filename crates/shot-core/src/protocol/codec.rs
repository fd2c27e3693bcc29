//! Newline-delimited JSON codec for the launch-monitor device protocol.
//!
//! Wire format:
//! ```text
//! {json object}\n{json object}\n...
//! ```
//! A trailing `\r` before the newline is tolerated and blank lines are
//! skipped.
//!
//! TCP is a stream: one `read()` may deliver half a frame or several frames at
//! once.  [`LineDecoder`] accumulates bytes with [`LineDecoder::push`] and
//! yields complete frames with [`LineDecoder::next_frame`].

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::protocol::messages::DeviceFrame;

/// Default upper bound on a single line, newline excluded.
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

/// Errors that can occur while encoding or decoding device frames.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The line is not valid JSON (or not valid UTF-8).
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The JSON object matched no known frame shape.
    #[error("unrecognized frame: {0}")]
    UnrecognizedFrame(String),

    /// The JSON object looked like a known frame but a field was wrong.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// More than `limit` bytes arrived without a newline.
    #[error("frame too long: {len} bytes without newline (limit {limit})")]
    FrameTooLong { len: usize, limit: usize },

    /// The frame could not be serialised.
    #[error("encode failed: {0}")]
    Encode(String),
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Serialises `frame` as one JSON line, newline included.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialisation fails.
///
/// # Examples
///
/// ```rust
/// use shot_core::encode_frame;
/// use shot_core::protocol::messages::ShotFrame;
///
/// let bytes = encode_frame(&ShotFrame::heartbeat("dev", 0)).unwrap();
/// assert_eq!(*bytes.last().unwrap(), b'\n');
/// ```
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(frame).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes one line (without its newline) into a [`DeviceFrame`].
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidJson`] for non-JSON input, or whatever
/// [`DeviceFrame::from_value`] reports for a JSON value of the wrong shape.
pub fn decode_frame(line: &[u8]) -> Result<DeviceFrame, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_slice(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    DeviceFrame::from_value(value)
}

/// Streaming line splitter + frame decoder.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_line: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl LineDecoder {
    /// Creates a decoder that rejects lines longer than `max_line` bytes.
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            max_line,
        }
    }

    /// Appends freshly read bytes to the internal buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns the next complete frame, or `None` if more bytes are needed.
    ///
    /// A bad line yields `Some(Err(..))` and is consumed, so the caller can log
    /// it and keep calling.  When the buffer grows past the line limit without
    /// a newline, the buffer is discarded and
    /// [`ProtocolError::FrameTooLong`] is returned once.
    pub fn next_frame(&mut self) -> Option<Result<DeviceFrame, ProtocolError>> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                if self.buf.len() > self.max_line {
                    let len = self.buf.len();
                    self.buf.clear();
                    return Some(Err(ProtocolError::FrameTooLong {
                        len,
                        limit: self.max_line,
                    }));
                }
                return None;
            };

            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = trim_line(&line[..line.len() - 1]);

            if line.is_empty() {
                continue;
            }

            if line.len() > self.max_line {
                return Some(Err(ProtocolError::FrameTooLong {
                    len: line.len(),
                    limit: self.max_line,
                }));
            }

            let result = decode_frame(line);
            if let Err(e) = &result {
                debug!("discarding device line ({} bytes): {e}", line.len());
            }
            return Some(result);
        }
    }
}

/// Strips surrounding ASCII whitespace (including a trailing `\r`).
fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &line[start..end]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
