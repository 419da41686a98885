//! Decoded invocation request.

use std::collections::HashMap;

use bytes::Bytes;

use super::Format;
use crate::codec::{Body, CodecTable};
use crate::error::Result;

/// Invocation metadata carried by the envelope.
///
/// The JSON envelope fills these from `call_id`, `deadline` and the
/// `protocol` object; the HTTP envelope from the request line and the
/// `Fn_*` headers. A CloudEvent supplies its `eventID` as the call ID and
/// the rest from its `extensions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub call_id: Option<String>,
    pub deadline: Option<String>,
    /// Originating protocol type (`http` for the fn gateway).
    pub protocol_type: Option<String>,
    pub method: Option<String>,
    pub request_url: Option<String>,
    /// Decoded query string pairs, in order of appearance.
    pub query: Vec<(String, String)>,
    /// HTTP version token (`HTTP/1.1`), HTTP envelope only.
    pub version: Option<String>,
    /// CloudEvent `source`.
    pub source: Option<String>,
    /// CloudEvent `eventType`.
    pub event_type: Option<String>,
}

/// One invocation as read off the pipe, before body coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub format: Format,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub raw_body: Bytes,
    pub meta: RequestMeta,
}

impl InvocationRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Coerce the raw body through the codec table.
    pub fn decode_body(&self, codecs: &CodecTable) -> Result<Body> {
        codecs.coerce(&self.content_type, &self.raw_body)
    }
}

pub(crate) fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
