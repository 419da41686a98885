//! JSON envelope.
//!
//! Inbound:
//!
//! ```text
//! {"body": <string|value>, "content_type": "...", "call_id": "...",
//!  "deadline": "...", "protocol": {"type": "http", "method": "GET",
//!  "request_url": "...", "headers": {"X-Name": ["v1", "v2"]}}}
//! ```
//!
//! A string `body` is handed to the codec as its text, so under the
//! default `application/json` content type a double-encoded body
//! (`"{\"data\": 42}"`) is parsed a second time. Any other value is
//! re-serialized and decoded the same way, which leaves it unchanged.
//!
//! Outbound success mirrors that depth: the handler result is wrapped as
//! `{"data": result}`, encoded to a string, and placed in
//! `{"body": "<string>", "status_code": 202}`.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::frame_buffer::Scan;
use super::request::find_header;
use super::{Format, InvocationRequest, InvocationResponse, RequestMeta};
use crate::codec::DEFAULT_CONTENT_TYPE;
use crate::error::{HotfnError, Result};
use crate::handler::Reply;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    body: Value,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    protocol: Option<ProtocolInfo>,
}

/// The `protocol` object describing the originating request. Also carried
/// in CloudEvent `extensions`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ProtocolInfo {
    #[serde(rename = "type", default)]
    pub(super) kind: Option<String>,
    #[serde(default)]
    pub(super) method: Option<String>,
    #[serde(default)]
    pub(super) request_url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, HeaderValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeaderValue {
    One(String),
    Many(Vec<String>),
}

impl HeaderValue {
    fn join(self) -> String {
        match self {
            HeaderValue::One(v) => v,
            HeaderValue::Many(vs) => vs.join(", "),
        }
    }
}

impl ProtocolInfo {
    /// Take the headers, joining repeated values with `", "`.
    pub(super) fn take_headers(&mut self) -> HashMap<String, String> {
        std::mem::take(&mut self.headers)
            .into_iter()
            .map(|(name, value)| (name, value.join()))
            .collect()
    }
}

#[derive(Serialize)]
struct ResponseEnvelope<'a> {
    body: &'a str,
    status_code: u16,
    #[serde(skip_serializing_if = "no_headers")]
    headers: &'a HashMap<String, String>,
}

fn no_headers(headers: &&HashMap<String, String>) -> bool {
    headers.is_empty()
}

/// Parse a JSON envelope.
///
/// # Errors
///
/// Returns [`HotfnError::Decode`] with the parser's message if the chunk is
/// not a JSON object of the expected shape.
pub fn parse_request(chunk: &[u8], default_content_type: &str) -> Result<InvocationRequest> {
    let value: Value =
        serde_json::from_slice(chunk).map_err(|e| HotfnError::Decode(e.to_string()))?;
    if !value.is_object() {
        return Err(HotfnError::decode("envelope must be a JSON object"));
    }
    let envelope = Envelope::deserialize(value).map_err(|e| HotfnError::Decode(e.to_string()))?;

    let mut protocol = envelope.protocol.unwrap_or_default();
    let headers = protocol.take_headers();

    let content_type = envelope
        .content_type
        .filter(|ct| !ct.trim().is_empty())
        .or_else(|| find_header(&headers, "Content-Type").map(str::to_owned))
        .unwrap_or_else(|| default_or_json(default_content_type));

    let raw_body = match envelope.body {
        Value::Null => Bytes::new(),
        Value::String(text) => Bytes::from(text),
        other => Bytes::from(serde_json::to_vec(&other)?),
    };

    Ok(InvocationRequest {
        format: Format::Json,
        content_type,
        headers,
        raw_body,
        meta: RequestMeta {
            call_id: envelope.call_id,
            deadline: envelope.deadline,
            protocol_type: protocol.kind,
            method: protocol.method,
            request_url: protocol.request_url,
            ..Default::default()
        },
    })
}

/// Wrap a handler reply as `{"data": result}`.
///
/// Both levels are written compactly, without spaces after separators.
pub fn build_response(reply: Reply, status_code: u16) -> Result<InvocationResponse> {
    let data = reply.body.to_json_value()?;
    let mut inner = serde_json::Map::with_capacity(1);
    inner.insert("data".to_string(), data);
    let body = serde_json::to_vec(&Value::Object(inner))?;

    Ok(InvocationResponse {
        format: Format::Json,
        status_code: reply.status_code.unwrap_or(status_code),
        content_type: DEFAULT_CONTENT_TYPE.to_string(),
        headers: reply.headers,
        body: Bytes::from(body),
    })
}

/// Serialize the outer `{"body": ..., "status_code": ...}` envelope.
pub fn write_response(response: &InvocationResponse) -> Result<Bytes> {
    let body = std::str::from_utf8(&response.body)
        .map_err(|e| HotfnError::Encode(format!("response body is not UTF-8: {}", e)))?;
    let envelope = ResponseEnvelope {
        body,
        status_code: response.status_code,
        headers: &response.headers,
    };
    Ok(Bytes::from(serde_json::to_vec(&envelope)?))
}

/// Find the end of the first JSON value in `buf`.
///
/// `buf` must start with a non-whitespace byte. A value that fails to parse
/// is still delimited as one unit so it yields a single error: an object or
/// array runs to its matching close bracket, anything else to the end of the
/// line. Until that end has arrived the scan reports `Incomplete`.
pub(crate) fn scan_frame(buf: &[u8]) -> Scan {
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<serde::de::IgnoredAny>();
    match values.next() {
        Some(Ok(_)) => Scan::Complete(values.byte_offset()),
        Some(Err(e)) if e.is_eof() => Scan::Incomplete(None),
        Some(Err(_)) => malformed_extent(buf),
        None => Scan::Incomplete(None),
    }
}

/// Extent of a value that does not parse.
///
/// Brackets are counted outside of string literals; the kind of bracket is
/// not checked.
fn malformed_extent(buf: &[u8]) -> Scan {
    if !matches!(buf.first(), Some(b'{') | Some(b'[')) {
        return match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => Scan::Invalid(pos + 1),
            None => Scan::Incomplete(None),
        };
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in buf.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Scan::Invalid(i + 1);
                }
            }
            _ => {}
        }
    }
    Scan::Incomplete(None)
}

pub(super) fn default_or_json(default_content_type: &str) -> String {
    if default_content_type.trim().is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        default_content_type.to_string()
    }
}
