//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management and a small state machine
//! to cut the inbound byte stream into one envelope per frame:
//!
//! - [`Framing::Chunk`]: every read is taken as exactly one envelope.
//! - [`Framing::Envelope`]: the envelope delimits itself (end of the JSON
//!   value, or HTTP head plus its body).
//! - [`Framing::Newline`]: one envelope per `\n`-terminated line.
//! - [`Framing::LengthPrefixed`]: 4-byte big-endian length, then payload.
//!
//! Oversized frames are reported once as [`Frame::Rejected`] and the rest
//! of their bytes are skipped.
//!
//! # Example
//!
//! ```
//! use hotfn_worker::protocol::{Format, Frame, FrameBuffer, Framing};
//!
//! let mut buffer = FrameBuffer::new(Framing::Envelope, Format::Json);
//! assert!(buffer.push(br#"{"body": "#).is_empty());
//!
//! let frames = buffer.push(br#"{}}{"body": 1}"#);
//! assert_eq!(frames.len(), 2);
//! assert!(matches!(&frames[0], Frame::Message(b) if &b[..] == br#"{"body": {}}"#));
//! ```

use std::str::FromStr;

use bytes::{Buf, Bytes, BytesMut};

use super::{http, json, Format};
use crate::error::HotfnError;

/// Default maximum frame size (4 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Size of the length prefix in [`Framing::LengthPrefixed`] mode.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// How envelopes are delimited on the inbound stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    Chunk,
    #[default]
    Envelope,
    Newline,
    LengthPrefixed,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Chunk => "chunk",
            Framing::Envelope => "envelope",
            Framing::Newline => "newline",
            Framing::LengthPrefixed => "length-prefixed",
        }
    }
}

impl FromStr for Framing {
    type Err = HotfnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chunk" => Ok(Framing::Chunk),
            "" | "envelope" => Ok(Framing::Envelope),
            "newline" | "line" => Ok(Framing::Newline),
            "length-prefixed" | "length" => Ok(Framing::LengthPrefixed),
            other => Err(HotfnError::Config(format!("unknown framing: {}", other))),
        }
    }
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit handed from the framer to the connection.
#[derive(Debug)]
pub enum Frame {
    /// Bytes of one envelope.
    Message(Bytes),
    /// A frame that could not be accepted; answered with an error payload.
    Rejected(HotfnError),
}

/// Result of scanning the buffer for a self-delimited envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scan {
    /// More bytes needed; total frame length if already known.
    Incomplete(Option<usize>),
    /// A complete envelope of this many bytes.
    Complete(usize),
    /// Unparseable prefix of this many bytes, handed on so the parser
    /// reports it.
    Invalid(usize),
}

/// Framing state.
#[derive(Debug, Clone, Copy)]
enum State {
    Ready,
    /// Length prefix read, waiting for this many payload bytes.
    WaitingForPayload { remaining: usize },
    /// Dropping the rest of a rejected frame of known length.
    Skipping { remaining: usize },
    /// Dropping the rest of a rejected frame up to the next newline.
    Discarding,
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    framing: Framing,
    format: Format,
    max_frame_size: usize,
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default size limit.
    pub fn new(framing: Framing, format: Format) -> Self {
        Self::with_max_frame_size(framing, format, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom size limit.
    pub fn with_max_frame_size(framing: Framing, format: Format, max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            framing,
            format,
            max_frame_size,
            state: State::Ready,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data stays buffered for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        if self.framing == Framing::Chunk {
            return self.push_chunk(data).into_iter().collect();
        }

        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    /// Flush whatever is left once the inbound stream has ended.
    ///
    /// A leftover partial envelope is still handed over so the caller gets
    /// an error payload rather than silence.
    pub fn finish(&mut self) -> Option<Frame> {
        let state = std::mem::replace(&mut self.state, State::Ready);
        let rest = self.buffer.split().freeze();

        match state {
            State::Skipping { .. } | State::Discarding => None,
            State::WaitingForPayload { remaining } => Some(Frame::Rejected(HotfnError::Decode(
                format!(
                    "stream ended inside a frame: {} of {} bytes received",
                    rest.len(),
                    remaining
                ),
            ))),
            State::Ready if rest.iter().all(u8::is_ascii_whitespace) => None,
            State::Ready if self.framing == Framing::LengthPrefixed => {
                Some(Frame::Rejected(HotfnError::decode(
                    "stream ended inside a length prefix",
                )))
            }
            State::Ready => Some(Frame::Message(rest)),
        }
    }

    fn push_chunk(&mut self, data: &[u8]) -> Option<Frame> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        if data.len() > self.max_frame_size {
            return Some(Frame::Rejected(HotfnError::FrameTooLarge {
                size: data.len(),
                max: self.max_frame_size,
            }));
        }
        Some(Frame::Message(Bytes::copy_from_slice(data)))
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                State::Skipping { remaining } => {
                    let n = remaining.min(self.buffer.len());
                    self.buffer.advance(n);
                    if n < remaining {
                        self.state = State::Skipping {
                            remaining: remaining - n,
                        };
                        return None;
                    }
                    self.state = State::Ready;
                }

                State::Discarding => match self.buffer.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        self.buffer.advance(pos + 1);
                        self.state = State::Ready;
                    }
                    None => {
                        self.buffer.clear();
                        return None;
                    }
                },

                State::WaitingForPayload { remaining } => {
                    if self.buffer.len() < remaining {
                        return None;
                    }
                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::Ready;
                    return Some(Frame::Message(payload));
                }

                State::Ready => {
                    return match self.framing {
                        Framing::LengthPrefixed => self.extract_length_prefixed(),
                        Framing::Newline => self.extract_line(),
                        Framing::Envelope => self.extract_envelope(),
                        Framing::Chunk => None,
                    };
                }
            }
        }
    }

    fn extract_length_prefixed(&mut self) -> Option<Frame> {
        if self.buffer.len() < LENGTH_PREFIX_SIZE {
            return None;
        }

        let len = self.buffer.get_u32() as usize;
        if len > self.max_frame_size {
            self.state = State::Skipping { remaining: len };
            return Some(self.too_large(len));
        }

        self.state = State::WaitingForPayload { remaining: len };
        self.try_extract_one()
    }

    fn extract_line(&mut self) -> Option<Frame> {
        loop {
            match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let line = self.buffer.split_to(pos + 1).freeze();
                    let content = line.slice(..trim_end(&line));
                    if content.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    if content.len() > self.max_frame_size {
                        return Some(self.too_large(content.len()));
                    }
                    return Some(Frame::Message(content));
                }
                None => {
                    if self.buffer.len() > self.max_frame_size {
                        let size = self.buffer.len();
                        self.buffer.clear();
                        self.state = State::Discarding;
                        return Some(self.too_large(size));
                    }
                    return None;
                }
            }
        }
    }

    fn extract_envelope(&mut self) -> Option<Frame> {
        let start = self
            .buffer
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buffer.len());
        self.buffer.advance(start);
        if self.buffer.is_empty() {
            return None;
        }

        let scan = match self.format {
            Format::Json | Format::CloudEvent => json::scan_frame(&self.buffer),
            Format::Http => http::scan_frame(&self.buffer),
        };

        match scan {
            Scan::Complete(len) | Scan::Invalid(len) if len > self.max_frame_size => {
                self.buffer.advance(len);
                Some(self.too_large(len))
            }
            Scan::Complete(len) | Scan::Invalid(len) => {
                Some(Frame::Message(self.buffer.split_to(len).freeze()))
            }
            Scan::Incomplete(Some(total)) if total > self.max_frame_size => {
                self.state = State::Skipping { remaining: total };
                Some(self.too_large(total))
            }
            Scan::Incomplete(None) if self.buffer.len() > self.max_frame_size => {
                let size = self.buffer.len();
                self.buffer.clear();
                self.state = State::Discarding;
                Some(self.too_large(size))
            }
            Scan::Incomplete(_) => None,
        }
    }

    fn too_large(&self, size: usize) -> Frame {
        Frame::Rejected(HotfnError::FrameTooLarge {
            size,
            max: self.max_frame_size,
        })
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Ready => "Ready",
            State::WaitingForPayload { .. } => "WaitingForPayload",
            State::Skipping { .. } => "Skipping",
            State::Discarding => "Discarding",
        }
    }
}

/// Length of `line` without its trailing `\r\n` / `\n`.
fn trim_end(line: &[u8]) -> usize {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    end
}
