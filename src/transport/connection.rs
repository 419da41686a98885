//! Connection lifecycle.
//!
//! A [`Connection`] is driven by three events in a fixed order:
//!
//! ```text
//! on_open ─► on_data* ─► on_close
//! ```
//!
//! `on_data` turns one inbound frame into exactly one outbound frame. Parser,
//! coercer and handler failures never escape it: they come back as an
//! `{"error": {"message": ...}}` line so the pipe stays usable.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::CodecTable;
use crate::error::{HotfnError, Result};
use crate::handler::{Dispatcher, InvocationContext};
use crate::protocol::{self, ErrorPayload, Format, Frame};
use crate::writer::OutboundFrame;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Open,
    Closed,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The inbound stream reached end of file.
    Eof,
    /// Reading the inbound stream failed.
    ReadError(String),
    /// Writing a response failed; nothing further can be delivered.
    WriteError(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Eof => f.write_str("eof"),
            CloseReason::ReadError(e) => write!(f, "read error: {}", e),
            CloseReason::WriteError(e) => write!(f, "write error: {}", e),
        }
    }
}

/// One duplex pipe serving invocations one at a time.
pub struct Connection {
    state: ConnectionState,
    format: Format,
    codecs: Arc<CodecTable>,
    dispatcher: Dispatcher,
    default_content_type: String,
    success_status: u16,
    invocations: u64,
}

impl Connection {
    pub fn new(
        format: Format,
        codecs: Arc<CodecTable>,
        dispatcher: Dispatcher,
        default_content_type: impl Into<String>,
        success_status: u16,
    ) -> Self {
        Self {
            state: ConnectionState::Idle,
            format,
            codecs,
            dispatcher,
            default_content_type: default_content_type.into(),
            success_status,
            invocations: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of frames handled so far.
    #[inline]
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Mark the channel ready. Only the first call has an effect.
    pub fn on_open(&mut self) {
        if self.state == ConnectionState::Idle {
            self.state = ConnectionState::Open;
            info!(format = %self.format, "connection opened");
        }
    }

    /// Handle one inbound frame and produce the frame to write back.
    ///
    /// Opens the connection implicitly if [`Connection::on_open`] was not
    /// called. Fails only with [`HotfnError::ConnectionClosed`] after
    /// [`Connection::on_close`]; every other failure is encoded as an
    /// error payload.
    pub async fn on_data(&mut self, frame: Frame) -> Result<OutboundFrame> {
        match self.state {
            ConnectionState::Closed => return Err(HotfnError::ConnectionClosed),
            ConnectionState::Idle => self.on_open(),
            ConnectionState::Open => {}
        }

        self.invocations += 1;
        let sequence = self.invocations;

        let result = match frame {
            Frame::Message(bytes) => self.invoke(&bytes, sequence).await,
            Frame::Rejected(err) => Err(err),
        };

        Ok(match result {
            Ok(out) => out,
            Err(e) => {
                warn!(sequence, kind = ?e.kind(), "invocation failed: {}", e);
                OutboundFrame::line(ErrorPayload::from(&e).encode())
            }
        })
    }

    /// Mark the channel finished. Only the first call has an effect.
    pub fn on_close(&mut self, reason: &CloseReason) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closed;
            info!(
                invocations = self.invocations,
                reason = %reason,
                "connection closed"
            );
        }
    }

    async fn invoke(&self, frame: &[u8], sequence: u64) -> Result<OutboundFrame> {
        let request = protocol::parse_request(self.format, frame, &self.default_content_type)?;
        debug!(
            sequence,
            content_type = %request.content_type,
            call_id = request.meta.call_id.as_deref().unwrap_or(""),
            "request parsed"
        );

        let mut body = request.decode_body(&self.codecs)?;
        if self.format == Format::Json {
            body = body.into_data();
        }

        let ctx = InvocationContext::from_request(&request, sequence);
        let reply = self.dispatcher.invoke(ctx, body).await?;

        let response =
            protocol::build_response(reply, &request, &self.codecs, self.success_status)?;
        let payload = response.encode()?;
        debug!(sequence, status = response.status_code, "response encoded");

        Ok(match self.format {
            Format::Json | Format::CloudEvent => OutboundFrame::line(payload),
            Format::Http => OutboundFrame::raw(payload),
        })
    }
}
