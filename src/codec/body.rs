//! Decoded invocation body.

use bytes::Bytes;
use serde_json::Value;

use crate::error::{HotfnError, Result};

/// Body after content-type coercion.
///
/// JSON and MessagePack bodies decode to [`Body::Json`], text bodies to
/// [`Body::Text`], and anything without a structured codec stays as
/// [`Body::Bytes`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl Body {
    /// Empty JSON body (`null`).
    pub fn null() -> Self {
        Body::Json(Value::Null)
    }

    /// Borrow the JSON value, if this is a JSON body.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the text, if this is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Take the `data` member out of a JSON object body.
    ///
    /// Bodies that are not JSON objects, or objects without `data`, are
    /// returned unchanged.
    pub fn into_data(self) -> Body {
        match self {
            Body::Json(Value::Object(mut map)) => match map.remove("data") {
                Some(data) => Body::Json(data),
                None => Body::Json(Value::Object(map)),
            },
            other => other,
        }
    }

    /// Convert to a JSON value for embedding in a JSON envelope.
    ///
    /// Binary bodies must be valid UTF-8 and become a JSON string.
    pub fn to_json_value(&self) -> Result<Value> {
        match self {
            Body::Json(v) => Ok(v.clone()),
            Body::Text(s) => Ok(Value::String(s.clone())),
            Body::Bytes(b) => std::str::from_utf8(b)
                .map(|s| Value::String(s.to_owned()))
                .map_err(|e| HotfnError::Encode(format!("binary body is not UTF-8: {}", e))),
        }
    }

    /// Raw bytes view used by pass-through encoding.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Body::Json(v) => Ok(Bytes::from(serde_json::to_vec(v)?)),
            Body::Text(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            Body::Bytes(b) => Ok(b.clone()),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::null()
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}
