//! CloudEvent envelope (CloudEvents 0.1 JSON encoding).
//!
//! Inbound, one event per frame:
//!
//! ```text
//! {"cloudEventsVersion": "0.1", "eventID": "...", "source": "...",
//!  "eventType": "...", "contentType": "application/json",
//!  "extensions": {"deadline": "...", "protocol": {"type": "http",
//!  "method": "POST", "request_url": "...", "headers": {...}}},
//!  "data": <value>}
//! ```
//!
//! `data` is already a value, so it is not decoded twice: JSON content
//! types get it re-serialized, other types get a string's text as is.
//!
//! Outbound success is an event again, echoing `eventID`, `source` and
//! `eventType`, with the handler result in `data` and the status code and
//! reply headers in `extensions.protocol`.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::json::{default_or_json, ProtocolInfo};
use super::request::find_header;
use super::{Format, InvocationRequest, InvocationResponse, RequestMeta};
use crate::codec::{is_json, Body, CodecTable};
use crate::error::{HotfnError, Result};
use crate::handler::Reply;

/// Version written on outbound events.
pub const CLOUD_EVENTS_VERSION: &str = "0.1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventIn {
    #[serde(rename = "eventID", default)]
    event_id: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    extensions: Extensions,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
struct Extensions {
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    protocol: Option<ProtocolInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventOut<'a> {
    cloud_events_version: &'a str,
    #[serde(rename = "eventID", skip_serializing_if = "Option::is_none")]
    event_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_type: Option<&'a str>,
    content_type: &'a str,
    extensions: ExtensionsOut<'a>,
    #[serde(skip_serializing_if = "Value::is_null")]
    data: Value,
}

#[derive(Serialize)]
struct ExtensionsOut<'a> {
    protocol: ProtocolOut<'a>,
}

#[derive(Serialize)]
struct ProtocolOut<'a> {
    status_code: u16,
    headers: BTreeMap<&'a str, [&'a str; 1]>,
}

/// Parse a CloudEvent envelope.
///
/// # Errors
///
/// Returns [`HotfnError::Decode`] if the chunk is not a JSON object of the
/// event shape.
pub fn parse_request(chunk: &[u8], default_content_type: &str) -> Result<InvocationRequest> {
    let value: Value =
        serde_json::from_slice(chunk).map_err(|e| HotfnError::Decode(e.to_string()))?;
    if !value.is_object() {
        return Err(HotfnError::decode("CloudEvent must be a JSON object"));
    }
    let event = EventIn::deserialize(value)
        .map_err(|e| HotfnError::Decode(format!("invalid CloudEvent: {}", e)))?;
    let mut protocol = event.extensions.protocol.unwrap_or_default();
    let headers = protocol.take_headers();

    let content_type = event
        .content_type
        .filter(|ct| !ct.trim().is_empty())
        .or_else(|| find_header(&headers, "Content-Type").map(str::to_owned))
        .unwrap_or_else(|| default_or_json(default_content_type));

    let raw_body = match event.data {
        Value::Null => Bytes::new(),
        Value::String(text) if !is_json(&content_type) => Bytes::from(text),
        other => Bytes::from(serde_json::to_vec(&other)?),
    };

    Ok(InvocationRequest {
        format: Format::CloudEvent,
        content_type,
        headers,
        raw_body,
        meta: RequestMeta {
            call_id: event.event_id,
            deadline: event.extensions.deadline,
            protocol_type: protocol.kind,
            method: protocol.method,
            request_url: protocol.request_url,
            source: event.source,
            event_type: event.event_type,
            ..Default::default()
        },
    })
}

/// Wrap a handler reply as an outbound event.
///
/// JSON content types carry the result as a value; any other type is
/// encoded by its codec and carried as a string.
pub fn build_response(
    reply: Reply,
    request: &InvocationRequest,
    codecs: &CodecTable,
    status_code: u16,
) -> Result<InvocationResponse> {
    let content_type = reply
        .content_type
        .clone()
        .unwrap_or_else(|| request.content_type.clone());
    let status_code = reply.status_code.unwrap_or(status_code);

    let data = if is_json(&content_type) {
        reply.body.to_json_value()?
    } else {
        match &reply.body {
            Body::Json(Value::Null) => Value::Null,
            body => {
                let encoded = codecs.encode(&content_type, body)?;
                let text = String::from_utf8(encoded.to_vec()).map_err(|_| {
                    HotfnError::Encode(format!(
                        "{} body is not valid UTF-8 and cannot be carried in a CloudEvent",
                        content_type
                    ))
                })?;
                Value::String(text)
            }
        }
    };

    let event = EventOut {
        cloud_events_version: CLOUD_EVENTS_VERSION,
        event_id: request.meta.call_id.as_deref(),
        source: request.meta.source.as_deref(),
        event_type: request.meta.event_type.as_deref(),
        content_type: &content_type,
        extensions: ExtensionsOut {
            protocol: ProtocolOut {
                status_code,
                headers: header_lists(&reply.headers),
            },
        },
        data,
    };
    let body = Bytes::from(serde_json::to_vec(&event)?);

    Ok(InvocationResponse {
        format: Format::CloudEvent,
        status_code,
        content_type,
        headers: reply.headers,
        body,
    })
}

/// The event is fully built by [`build_response`].
pub fn write_response(response: &InvocationResponse) -> Result<Bytes> {
    Ok(response.body.clone())
}

fn header_lists(headers: &HashMap<String, String>) -> BTreeMap<&str, [&str; 1]> {
    headers
        .iter()
        .map(|(name, value)| (name.as_str(), [value.as_str()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EVENT: &[u8] = br#"{
        "cloudEventsVersion": "0.1",
        "eventID": "ev-1",
        "source": "http://example.com/repo",
        "eventType": "com.example.push",
        "eventTime": "2018-04-05T17:31:00Z",
        "contentType": "application/json",
        "extensions": {
            "deadline": "2030-01-01T00:00:00Z",
            "protocol": {"type": "http", "method": "POST",
                         "request_url": "http://localhost/r/app/fn",
                         "headers": {"X-Trace": ["a", "b"]}},
            "extra": 1
        },
        "data": {"name": "fn"}
    }"#;

    #[test]
    fn test_parse_event() {
        let req = parse_request(EVENT, "application/json").unwrap();

        assert_eq!(req.format, Format::CloudEvent);
        assert_eq!(req.content_type, "application/json");
        assert_eq!(req.meta.call_id.as_deref(), Some("ev-1"));
        assert_eq!(req.meta.deadline.as_deref(), Some("2030-01-01T00:00:00Z"));
        assert_eq!(req.meta.source.as_deref(), Some("http://example.com/repo"));
        assert_eq!(req.meta.event_type.as_deref(), Some("com.example.push"));
        assert_eq!(req.meta.method.as_deref(), Some("POST"));
        assert_eq!(req.header("x-trace"), Some("a, b"));
        assert_eq!(
            req.decode_body(&CodecTable::with_defaults()).unwrap(),
            Body::Json(json!({"name": "fn"}))
        );
    }

    #[test]
    fn test_string_data_is_not_decoded_twice() {
        let codecs = CodecTable::with_defaults();

        let req = parse_request(br#"{"data": "{\"a\": 1}"}"#, "application/json").unwrap();
        assert_eq!(
            req.decode_body(&codecs).unwrap(),
            Body::Json(json!("{\"a\": 1}"))
        );

        let req =
            parse_request(br#"{"contentType": "text/plain", "data": "hi"}"#, "").unwrap();
        assert_eq!(req.decode_body(&codecs).unwrap(), Body::Text("hi".into()));

        let req = parse_request(br#"{"eventID": "x"}"#, "").unwrap();
        assert!(req.raw_body.is_empty());
    }

    #[test]
    fn test_malformed_events() {
        for chunk in [&b"[1]"[..], b"{\"data\": ", br#"{"extensions": 3}"#] {
            assert!(matches!(
                parse_request(chunk, "application/json"),
                Err(HotfnError::Decode(_))
            ));
        }
    }

    #[test]
    fn test_build_json_response() {
        let request = parse_request(EVENT, "application/json").unwrap();
        let reply = Reply::new(json!({"ok": true}))
            .with_status(201)
            .with_header("X-Handled", "yes");
        let response =
            build_response(reply, &request, &CodecTable::with_defaults(), 200).unwrap();
        assert_eq!(response.status_code, 201);

        let event: Value = serde_json::from_slice(&write_response(&response).unwrap()).unwrap();
        assert_eq!(
            event,
            json!({
                "cloudEventsVersion": "0.1",
                "eventID": "ev-1",
                "source": "http://example.com/repo",
                "eventType": "com.example.push",
                "contentType": "application/json",
                "extensions": {"protocol": {
                    "status_code": 201,
                    "headers": {"X-Handled": ["yes"]}
                }},
                "data": {"ok": true}
            })
        );
    }

    #[test]
    fn test_build_text_response() {
        let request =
            parse_request(br#"{"contentType": "text/plain", "data": "hi"}"#, "").unwrap();
        let response = build_response(
            Reply::text("hello"),
            &request,
            &CodecTable::with_defaults(),
            200,
        )
        .unwrap();

        let event: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(event["contentType"], "text/plain");
        assert_eq!(event["data"], "hello");
        assert!(event.get("eventID").is_none());
        assert_eq!(event["extensions"]["protocol"]["status_code"], 200);
    }

    #[test]
    fn test_binary_reply_is_an_encode_error() {
        let request = parse_request(br#"{"data": 1}"#, "").unwrap();
        let reply = Reply::new(Body::from(vec![0xff, 0xfe]))
            .with_content_type("application/octet-stream");
        assert!(matches!(
            build_response(reply, &request, &CodecTable::with_defaults(), 200),
            Err(HotfnError::Encode(_))
        ));
    }
}
