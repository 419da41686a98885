//! Raw codec - pass-through for binary bodies.
//!
//! Used for `application/octet-stream` and, under the permissive policy,
//! for any content type without a registered codec.
//!
//! # Example
//!
//! ```
//! use hotfn_worker::codec::{Body, RawCodec};
//!
//! let body = RawCodec::decode(b"binary payload").unwrap();
//! assert_eq!(&RawCodec::encode(&body).unwrap()[..], b"binary payload");
//! ```

use bytes::Bytes;

use super::Body;
use crate::error::Result;

/// Raw codec that passes bytes through without transformation.
pub struct RawCodec;

impl RawCodec {
    /// Wrap the bytes in a [`Body::Bytes`] (copies into `Bytes`).
    #[inline]
    pub fn decode(data: &[u8]) -> Result<Body> {
        Ok(Body::Bytes(Bytes::copy_from_slice(data)))
    }

    /// Return the body's bytes as-is.
    #[inline]
    pub fn encode(body: &Body) -> Result<Bytes> {
        body.to_bytes()
    }
}
