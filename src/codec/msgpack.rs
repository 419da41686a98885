//! MsgPack codec using `rmp-serde`.
//!
//! Bodies are decoded into a `serde_json::Value` so handlers see the same
//! shape regardless of whether the caller sent JSON or MessagePack.
//! Encoding always uses `to_vec_named` so maps keep their field names.

use bytes::Bytes;
use serde_json::Value;

use super::Body;
use crate::error::{HotfnError, Result};

/// MessagePack codec for structured bodies.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Table entry: decode a MessagePack body.
    pub fn decode_body(data: &[u8]) -> Result<Body> {
        if data.is_empty() {
            return Ok(Body::null());
        }
        Self::decode::<Value>(data)
            .map(Body::Json)
            .map_err(|e| HotfnError::Decode(e.to_string()))
    }

    /// Table entry: encode a body as MessagePack.
    pub fn encode_body(body: &Body) -> Result<Bytes> {
        let value = body.to_json_value()?;
        Ok(Bytes::from(Self::encode(&value)?))
    }
}
