//! Plain text codec.

use bytes::Bytes;

use super::Body;
use crate::error::{HotfnError, Result};

/// UTF-8 text codec (`text/plain` and friends).
pub struct TextCodec;

impl TextCodec {
    /// Decode UTF-8 bytes into a [`Body::Text`].
    pub fn decode(data: &[u8]) -> Result<Body> {
        std::str::from_utf8(data)
            .map(|s| Body::Text(s.to_owned()))
            .map_err(|e| HotfnError::Decode(format!("body is not valid UTF-8: {}", e)))
    }

    /// Encode a body as text. JSON strings are written without quotes.
    pub fn encode(body: &Body) -> Result<Bytes> {
        match body {
            Body::Json(serde_json::Value::String(s)) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            other => other.to_bytes(),
        }
    }
}
