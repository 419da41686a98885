//! Handler reply.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::HandlerError;
use crate::codec::Body;

/// Successful handler result.
///
/// Only `body` is required; status code and content type fall back to the
/// wire format's defaults and the request's content type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub body: Body,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
}

impl Reply {
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Reply with a serializable value as a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Plain text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Body::Text(text.into())).with_content_type("text/plain")
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl From<Body> for Reply {
    fn from(body: Body) -> Self {
        Reply::new(body)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::new(value)
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::new(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::new(text)
    }
}
