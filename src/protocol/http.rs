//! Raw HTTP/1.x envelope.
//!
//! The request head is parsed with `httparse`. The body follows the blank
//! line: decoded from `Transfer-Encoding: chunked`, bounded by
//! `Content-Length`, or running to the end of the envelope. The fn gateway
//! headers `Fn_call_id`, `Fn_deadline`, `Fn_method` and `Fn_request_url`
//! take precedence over the request line for invocation metadata.
//!
//! Responses are written as an HTTP/1.1 status line, `Content-Type`,
//! `Content-Length`, any extra reply headers and the encoded body.

use std::collections::{BTreeMap, HashMap};

use bytes::{Bytes, BytesMut};
use httparse::Status;

use super::frame_buffer::Scan;
use super::request::find_header;
use super::{Format, InvocationRequest, InvocationResponse, RequestMeta};
use crate::codec::{CodecTable, DEFAULT_CONTENT_TYPE};
use crate::error::{HotfnError, Result};
use crate::handler::Reply;

/// Maximum number of headers accepted in one request head.
const MAX_HEADERS: usize = 64;

/// Parse a raw HTTP request envelope.
///
/// # Errors
///
/// Returns [`HotfnError::Decode`] for a malformed or truncated head, a
/// non-UTF-8 header value, an invalid `Content-Length`, a transfer coding
/// other than `chunked`, or a body shorter than announced.
pub fn parse_request(chunk: &[u8], default_content_type: &str) -> Result<InvocationRequest> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut slots);

    let head_len = match req
        .parse(chunk)
        .map_err(|e| HotfnError::Decode(format!("invalid HTTP request: {}", e)))?
    {
        Status::Complete(n) => n,
        Status::Partial => return Err(HotfnError::decode("incomplete HTTP request head")),
    };

    let method = req
        .method
        .ok_or_else(|| HotfnError::decode("missing HTTP method"))?
        .to_string();
    let target = req
        .path
        .ok_or_else(|| HotfnError::decode("missing request target"))?
        .to_string();
    let version = format!("HTTP/1.{}", req.version.unwrap_or(1));

    let mut headers: HashMap<String, String> = HashMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let value = std::str::from_utf8(header.value)
            .map_err(|_| HotfnError::Decode(format!("header {} is not valid UTF-8", header.name)))?
            .trim();
        headers
            .entry(header.name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let rest = &chunk[head_len..];
    let framing = body_length(
        find_header(&headers, "Transfer-Encoding"),
        find_header(&headers, "Content-Length"),
    )?;
    let raw_body = match framing {
        BodyLength::Chunked => match decode_chunked(rest)? {
            Some((body, _)) => body.freeze(),
            None => return Err(HotfnError::decode("chunked body is truncated")),
        },
        BodyLength::Fixed(len) if rest.len() < len => {
            return Err(HotfnError::Decode(format!(
                "body has {} bytes, Content-Length is {}",
                rest.len(),
                len
            )))
        }
        BodyLength::Fixed(len) => Bytes::copy_from_slice(&rest[..len]),
        BodyLength::ToEnd => Bytes::copy_from_slice(rest),
    };

    let query = match target.split_once('?') {
        Some((_, query)) => parse_query(query)?,
        None => Vec::new(),
    };

    let content_type = find_header(&headers, "Content-Type")
        .filter(|ct| !ct.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| {
            if default_content_type.trim().is_empty() {
                DEFAULT_CONTENT_TYPE.to_string()
            } else {
                default_content_type.to_string()
            }
        });

    let meta = RequestMeta {
        call_id: find_header(&headers, "Fn_call_id").map(str::to_owned),
        deadline: find_header(&headers, "Fn_deadline").map(str::to_owned),
        protocol_type: Some("http".to_string()),
        method: Some(
            find_header(&headers, "Fn_method")
                .map(str::to_owned)
                .unwrap_or(method),
        ),
        request_url: Some(
            find_header(&headers, "Fn_request_url")
                .map(str::to_owned)
                .unwrap_or_else(|| target.clone()),
        ),
        query,
        version: Some(version),
        ..Default::default()
    };

    Ok(InvocationRequest {
        format: Format::Http,
        content_type,
        headers,
        raw_body,
        meta,
    })
}

/// Encode a handler reply with the codec for its content type.
///
/// The reply's own content type wins; otherwise the request's is reused.
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
    let body = codecs.encode(&content_type, &reply.body)?;

    Ok(InvocationResponse {
        format: Format::Http,
        status_code: reply.status_code.unwrap_or(status_code),
        content_type,
        headers: reply.headers,
        body,
    })
}

/// Serialize an HTTP/1.1 response message.
pub fn write_response(response: &InvocationResponse) -> Result<Bytes> {
    let status = ::http::StatusCode::from_u16(response.status_code)
        .map_err(|e| HotfnError::Encode(format!("status {}: {}", response.status_code, e)))?;

    let mut out = BytesMut::with_capacity(128 + response.body.len());
    out.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    out.extend_from_slice(format!("Content-Type: {}\r\n", response.content_type).as_bytes());
    out.extend_from_slice(format!("Content-Length: {}\r\n", response.body.len()).as_bytes());

    // Sorted for stable output.
    let extra: BTreeMap<&String, &String> = response
        .headers
        .iter()
        .filter(|(name, _)| {
            !name.eq_ignore_ascii_case("Content-Type")
                && !name.eq_ignore_ascii_case("Content-Length")
        })
        .collect();
    for (name, value) in extra {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }

    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&response.body);
    Ok(out.freeze())
}

/// Find the end of the first HTTP request in `buf`.
///
/// A head that announces a body which cannot be delimited is reported as
/// invalid together with everything buffered behind it.
pub(crate) fn scan_frame(buf: &[u8]) -> Scan {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut slots);

    match req.parse(buf) {
        Ok(Status::Partial) => Scan::Incomplete(None),
        Ok(Status::Complete(head_len)) => {
            let transfer_encoding = joined_header(req.headers, "Transfer-Encoding");
            let content_length = joined_header(req.headers, "Content-Length");
            match body_length(transfer_encoding.as_deref(), content_length.as_deref()) {
                Err(_) => Scan::Invalid(buf.len()),
                Ok(BodyLength::Chunked) => match decode_chunked(&buf[head_len..]) {
                    Ok(Some((_, body_len))) => Scan::Complete(head_len + body_len),
                    Ok(None) => Scan::Incomplete(None),
                    Err(_) => Scan::Invalid(buf.len()),
                },
                Ok(BodyLength::Fixed(len)) => {
                    let total = head_len.saturating_add(len);
                    if buf.len() >= total {
                        Scan::Complete(total)
                    } else {
                        Scan::Incomplete(Some(total))
                    }
                }
                Ok(BodyLength::ToEnd) => Scan::Complete(head_len),
            }
        }
        Err(_) => Scan::Invalid(
            find_subslice(buf, b"\r\n\r\n")
                .map(|pos| pos + 4)
                .or_else(|| find_subslice(buf, b"\n\n").map(|pos| pos + 2))
                .unwrap_or(buf.len()),
        ),
    }
}

/// How the body of a request is delimited.
#[derive(Debug, PartialEq, Eq)]
enum BodyLength {
    Chunked,
    Fixed(usize),
    /// No framing headers: the body is the rest of the envelope.
    ToEnd,
}

/// `Transfer-Encoding` takes precedence over `Content-Length`.
fn body_length(
    transfer_encoding: Option<&str>,
    content_length: Option<&str>,
) -> Result<BodyLength> {
    if let Some(codings) = transfer_encoding {
        let mut codings = codings
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("identity"));
        return match (codings.next(), codings.next()) {
            (Some(coding), None) if coding.eq_ignore_ascii_case("chunked") => {
                Ok(BodyLength::Chunked)
            }
            (None, _) => Ok(BodyLength::ToEnd),
            _ => Err(HotfnError::Decode(format!(
                "unsupported Transfer-Encoding: {}",
                transfer_encoding.unwrap_or_default()
            ))),
        };
    }

    match content_length {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map(BodyLength::Fixed)
            .map_err(|_| HotfnError::Decode(format!("invalid Content-Length: {}", v))),
        None => Ok(BodyLength::ToEnd),
    }
}

/// Decode a chunked body from the start of `buf`.
///
/// Returns the decoded body and the number of bytes consumed, trailer
/// section included, or `None` while the final chunk or trailer has not
/// arrived yet.
fn decode_chunked(buf: &[u8]) -> Result<Option<(BytesMut, usize)>> {
    let mut body = BytesMut::new();
    let mut pos = 0;

    loop {
        let (size_len, size) = match httparse::parse_chunk_size(&buf[pos..])
            .map_err(|_| HotfnError::decode("invalid chunk size"))?
        {
            Status::Complete(parsed) => parsed,
            Status::Partial => return Ok(None),
        };
        pos += size_len;
        if size == 0 {
            break;
        }

        let data_end = usize::try_from(size)
            .ok()
            .and_then(|size| pos.checked_add(size))
            .ok_or_else(|| HotfnError::decode("chunk size out of range"))?;
        let chunk_end = data_end
            .checked_add(2)
            .ok_or_else(|| HotfnError::decode("chunk size out of range"))?;
        if buf.len() < chunk_end {
            return Ok(None);
        }
        if &buf[data_end..chunk_end] != b"\r\n" {
            return Err(HotfnError::decode("chunk data is not terminated by CRLF"));
        }
        body.extend_from_slice(&buf[pos..data_end]);
        pos = chunk_end;
    }

    // Trailer fields are dropped; the section ends with an empty line.
    loop {
        let line_end = match buf[pos..].iter().position(|&b| b == b'\n') {
            Some(offset) => pos + offset,
            None => return Ok(None),
        };
        let line = &buf[pos..line_end];
        pos = line_end + 1;
        if line.is_empty() || line == b"\r" {
            return Ok(Some((body, pos)));
        }
    }
}

fn joined_header(headers: &[httparse::Header<'_>], name: &str) -> Option<String> {
    let values: Vec<String> = headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| String::from_utf8_lossy(h.value).trim().to_string())
        .collect();
    (!values.is_empty()).then(|| values.join(", "))
}

fn parse_query(query: &str) -> Result<Vec<(String, String)>> {
    serde_urlencoded::from_str(query)
        .map_err(|e| HotfnError::Decode(format!("invalid query string: {}", e)))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
