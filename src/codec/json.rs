//! JSON codec using `serde_json`.
//!
//! An empty (or whitespace-only) body decodes to `null`, so envelopes that
//! carry no body still reach the handler.

use bytes::Bytes;

use super::Body;
use crate::error::{HotfnError, Result};

/// JSON codec for structured bodies.
pub struct JsonCodec;

impl JsonCodec {
    /// Decode JSON bytes into a [`Body::Json`].
    ///
    /// # Errors
    ///
    /// Returns [`HotfnError::Decode`] carrying the parser's message.
    pub fn decode(data: &[u8]) -> Result<Body> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Body::null());
        }
        serde_json::from_slice(data)
            .map(Body::Json)
            .map_err(|e| HotfnError::Decode(e.to_string()))
    }

    /// Encode a body as compact JSON text.
    pub fn encode(body: &Body) -> Result<Bytes> {
        let value = body.to_json_value()?;
        Ok(Bytes::from(serde_json::to_vec(&value)?))
    }
}
