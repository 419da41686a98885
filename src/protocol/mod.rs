//! Protocol module - envelopes, framing and response encoding.
//!
//! Three wire formats carry one invocation per envelope:
//!
//! - [`Format::Json`]: `{"body": ..., "content_type": ..., ...}`
//! - [`Format::Http`]: a raw HTTP/1.x request message
//! - [`Format::CloudEvent`]: a CloudEvents 0.1 JSON event
//!
//! [`parse_request`] turns one frame into an [`InvocationRequest`];
//! [`build_response`] turns a handler [`Reply`] into an
//! [`InvocationResponse`] in the same format. Failures are reported with
//! an [`ErrorPayload`], which has the same shape for every format.

pub mod cloudevent;
mod frame_buffer;
pub mod http;
pub mod json;
mod request;
mod response;

use std::str::FromStr;

pub use frame_buffer::{Frame, FrameBuffer, Framing, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
pub use request::{InvocationRequest, RequestMeta};
pub use response::{ErrorDetail, ErrorPayload, InvocationResponse};

use crate::codec::CodecTable;
use crate::error::{HotfnError, Result};
use crate::handler::Reply;

/// Envelope wire format spoken on the pipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    Http,
    CloudEvent,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Http => "http",
            Format::CloudEvent => "cloudevent",
        }
    }

    /// Status code used when the handler does not pick one.
    pub fn default_status(&self) -> u16 {
        match self {
            Format::Json => 202,
            Format::Http | Format::CloudEvent => 200,
        }
    }
}

impl FromStr for Format {
    type Err = HotfnError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "json" => Ok(Format::Json),
            "http" => Ok(Format::Http),
            "cloudevent" | "cloudevents" | "cloud-event" => Ok(Format::CloudEvent),
            other => Err(HotfnError::Config(format!("unknown format: {}", other))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode one frame into a request.
pub fn parse_request(
    format: Format,
    frame: &[u8],
    default_content_type: &str,
) -> Result<InvocationRequest> {
    match format {
        Format::Json => json::parse_request(frame, default_content_type),
        Format::Http => http::parse_request(frame, default_content_type),
        Format::CloudEvent => cloudevent::parse_request(frame, default_content_type),
    }
}

/// Encode a handler reply for the request's format.
pub fn build_response(
    reply: Reply,
    request: &InvocationRequest,
    codecs: &CodecTable,
    status_code: u16,
) -> Result<InvocationResponse> {
    match request.format {
        Format::Json => json::build_response(reply, status_code),
        Format::Http => http::build_response(reply, request, codecs, status_code),
        Format::CloudEvent => cloudevent::build_response(reply, request, codecs, status_code),
    }
}
