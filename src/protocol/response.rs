//! Outbound response and error payloads.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{cloudevent, http, json, Format};
use crate::error::{HotfnError, Result};

/// A successful invocation outcome, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResponse {
    pub format: Format,
    pub status_code: u16,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    /// Encoded body. For the JSON envelope this is the inner
    /// `{"data": ...}` document, for a CloudEvent the whole event.
    pub body: Bytes,
}

impl InvocationResponse {
    /// Serialize into the wire envelope matching `format`.
    pub fn encode(&self) -> Result<Bytes> {
        match self.format {
            Format::Json => json::write_response(self),
            Format::Http => http::write_response(self),
            Format::CloudEvent => cloudevent::write_response(self),
        }
    }
}

/// Terminal failure reported back to the caller as
/// `{"error": {"message": ...}}`.
///
/// Unlike a success envelope this carries no status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
            },
        }
    }

    pub fn message(&self) -> &str {
        &self.error.message
    }

    /// Serialize as a compact JSON object.
    pub fn encode(&self) -> Bytes {
        // A struct of strings always serializes.
        let text = serde_json::to_string(self)
            .unwrap_or_else(|_| String::from(r#"{"error":{"message":"internal error"}}"#));
        Bytes::from(text)
    }
}

impl From<&HotfnError> for ErrorPayload {
    fn from(err: &HotfnError) -> Self {
        ErrorPayload::new(err.message())
    }
}
