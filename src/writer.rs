//! Outbound frame writer.
//!
//! Every invocation produces exactly one [`OutboundFrame`]. The writer
//! assembles the whole frame (length prefix, payload, line terminator) in
//! one buffer, writes it with a single `write_all` and flushes, so the
//! consumer never observes half a response.
//!
//! ```text
//! Connection::on_data ─► OutboundFrame ─► FrameWriter ─► stdout
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::protocol::{Framing, LENGTH_PREFIX_SIZE};

/// A frame ready to be written to the outbound pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Encoded envelope.
    pub payload: Bytes,
    /// Terminate with `\n` (JSON documents); HTTP messages are
    /// self-delimiting and go out as-is.
    pub line: bool,
}

impl OutboundFrame {
    /// A newline-terminated frame.
    #[inline]
    pub fn line(payload: Bytes) -> Self {
        Self {
            payload,
            line: true,
        }
    }

    /// A frame written without terminator.
    #[inline]
    pub fn raw(payload: Bytes) -> Self {
        Self {
            payload,
            line: false,
        }
    }

    /// Size on the wire under the given framing.
    #[inline]
    pub fn size(&self, framing: Framing) -> usize {
        match framing {
            Framing::LengthPrefixed => LENGTH_PREFIX_SIZE + self.payload.len(),
            _ => self.payload.len() + usize::from(self.line),
        }
    }
}

/// Writes one frame at a time to the outbound stream.
pub struct FrameWriter<W> {
    writer: W,
    framing: Framing,
    frames_written: u64,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, framing: Framing) -> Self {
        Self {
            writer,
            framing,
            frames_written: 0,
        }
    }

    /// Write a complete frame and flush.
    ///
    /// Under [`Framing::LengthPrefixed`] the payload is preceded by its
    /// 4-byte big-endian length and no newline is added.
    pub async fn write_frame(&mut self, frame: &OutboundFrame) -> Result<()> {
        let mut buf = BytesMut::with_capacity(frame.size(self.framing));
        match self.framing {
            Framing::LengthPrefixed => {
                buf.put_u32(frame.payload.len() as u32);
                buf.put_slice(&frame.payload);
            }
            _ => {
                buf.put_slice(&frame.payload);
                if frame.line {
                    buf.put_u8(b'\n');
                }
            }
        }

        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        self.frames_written += 1;
        Ok(())
    }

    /// Number of frames written so far.
    #[inline]
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and shut down the outbound stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
