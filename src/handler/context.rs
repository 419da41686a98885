//! Invocation context for handlers.
//!
//! Carries everything about the invocation except the body: content type,
//! headers, and envelope metadata such as the call ID and deadline.
//!
//! # Example
//!
//! ```
//! use hotfn_worker::handler::InvocationContext;
//! use hotfn_worker::protocol::Format;
//!
//! let ctx = InvocationContext::new(Format::Json, "application/json")
//!     .with_header("X-Request-Id", "abc");
//! assert_eq!(ctx.header("x-request-id"), Some("abc"));
//! ```

use std::collections::HashMap;

use crate::protocol::{Format, InvocationRequest, RequestMeta};

/// Context passed to the user handler alongside the decoded body.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    format: Format,
    content_type: String,
    headers: HashMap<String, String>,
    meta: RequestMeta,
    /// 1-based position of this invocation on the connection.
    sequence: u64,
}

impl InvocationContext {
    /// Create a bare context (tests, direct dispatch).
    pub fn new(format: Format, content_type: impl Into<String>) -> Self {
        Self {
            format,
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    /// Build the context for a parsed request.
    pub fn from_request(request: &InvocationRequest, sequence: u64) -> Self {
        Self {
            format: request.format,
            content_type: request.content_type.clone(),
            headers: request.headers.clone(),
            meta: request.meta.clone(),
            sequence,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the call ID.
    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.meta.call_id = Some(call_id.into());
        self
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn call_id(&self) -> Option<&str> {
        self.meta.call_id.as_deref()
    }

    pub fn deadline(&self) -> Option<&str> {
        self.meta.deadline.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.meta.method.as_deref()
    }

    pub fn request_url(&self) -> Option<&str> {
        self.meta.request_url.as_deref()
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.meta.query
    }

    /// First query parameter with the given name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.meta
            .query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Event source, CloudEvent envelope only.
    pub fn source(&self) -> Option<&str> {
        self.meta.source.as_deref()
    }

    pub fn event_type(&self) -> Option<&str> {
        self.meta.event_type.as_deref()
    }

    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
