//! Codec module - content-type coercion for invocation bodies.
//!
//! A [`CodecTable`] maps a content type to a [`Codec`], a pair of plain
//! function pointers that decode raw body bytes into a [`Body`] and encode a
//! [`Body`] back to bytes. The table is built once when the worker starts and
//! is shared read-only afterwards.
//!
//! Built-in codecs:
//!
//! - [`JsonCodec`] - `application/json` and any `+json` structured suffix
//! - [`TextCodec`] - `text/plain` and other `text/*` types
//! - [`RawCodec`] - `application/octet-stream`, pass-through
//! - [`MsgPackCodec`] - `application/msgpack`, `application/x-msgpack`
//!
//! # Example
//!
//! ```
//! use hotfn_worker::codec::{Body, CodecTable};
//! use serde_json::json;
//!
//! let table = CodecTable::with_defaults();
//! let body = table.coerce("application/json; charset=utf-8", br#"{"data": 1}"#).unwrap();
//! assert_eq!(body, Body::Json(json!({"data": 1})));
//! ```

mod body;
mod json;
mod msgpack;
mod raw;
mod text;

use std::collections::HashMap;

use bytes::Bytes;

pub use body::Body;
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;
pub use text::TextCodec;

use crate::error::{HotfnError, Result};

/// Content type used when an envelope does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Decode half of a codec.
pub type DecodeFn = fn(&[u8]) -> Result<Body>;

/// Encode half of a codec.
pub type EncodeFn = fn(&Body) -> Result<Bytes>;

/// A decode/encode function pair registered for a content type.
#[derive(Clone, Copy)]
pub struct Codec {
    pub decode: DecodeFn,
    pub encode: EncodeFn,
}

impl Codec {
    pub const fn new(decode: DecodeFn, encode: EncodeFn) -> Self {
        Self { decode, encode }
    }

    pub const fn json() -> Self {
        Self::new(JsonCodec::decode, JsonCodec::encode)
    }

    pub const fn text() -> Self {
        Self::new(TextCodec::decode, TextCodec::encode)
    }

    pub const fn raw() -> Self {
        Self::new(RawCodec::decode, RawCodec::encode)
    }

    pub const fn msgpack() -> Self {
        Self::new(MsgPackCodec::decode_body, MsgPackCodec::encode_body)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

/// What to do with a content type that has no registered codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoercionPolicy {
    /// Hand the raw bytes through unchanged.
    #[default]
    Permissive,
    /// Fail with [`HotfnError::UnsupportedContentType`].
    Strict,
}

/// Registry mapping content types to codecs.
///
/// Keys are MIME essences (`type/subtype`, lowercase); parameters such as
/// `charset` are ignored on lookup.
#[derive(Debug, Clone)]
pub struct CodecTable {
    codecs: HashMap<String, Codec>,
    policy: CoercionPolicy,
}

impl CodecTable {
    /// Create an empty table with the given policy.
    pub fn new(policy: CoercionPolicy) -> Self {
        Self {
            codecs: HashMap::new(),
            policy,
        }
    }

    /// Create a permissive table holding the built-in codecs.
    pub fn with_defaults() -> Self {
        let mut table = Self::new(CoercionPolicy::Permissive);
        table.register("application/json", Codec::json());
        table.register("text/plain", Codec::text());
        table.register("application/octet-stream", Codec::raw());
        table.register("application/msgpack", Codec::msgpack());
        table.register("application/x-msgpack", Codec::msgpack());
        table
    }

    /// Register (or replace) the codec for a content type.
    pub fn register(&mut self, content_type: &str, codec: Codec) {
        self.codecs.insert(essence(content_type), codec);
    }

    /// Change the unknown-content-type policy.
    pub fn set_policy(&mut self, policy: CoercionPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> CoercionPolicy {
        self.policy
    }

    /// Find the codec for a content type.
    ///
    /// Exact essence matches win; otherwise `+json` suffixes resolve to the
    /// JSON codec and `text/*` to the plain text codec.
    pub fn lookup(&self, content_type: &str) -> Option<&Codec> {
        let key = essence(content_type);
        if let Some(codec) = self.codecs.get(&key) {
            return Some(codec);
        }
        if key.ends_with("+json") {
            return self.codecs.get("application/json");
        }
        if key.starts_with("text/") {
            return self.codecs.get("text/plain");
        }
        None
    }

    /// Decode a raw body according to its content type.
    pub fn coerce(&self, content_type: &str, raw: &[u8]) -> Result<Body> {
        match self.lookup(content_type) {
            Some(codec) => (codec.decode)(raw),
            None => match self.policy {
                CoercionPolicy::Permissive => RawCodec::decode(raw),
                CoercionPolicy::Strict => Err(HotfnError::UnsupportedContentType(
                    content_type.to_string(),
                )),
            },
        }
    }

    /// Encode a body according to a content type.
    pub fn encode(&self, content_type: &str, body: &Body) -> Result<Bytes> {
        match self.lookup(content_type) {
            Some(codec) => (codec.encode)(body),
            None => match self.policy {
                CoercionPolicy::Permissive => RawCodec::encode(body),
                CoercionPolicy::Strict => Err(HotfnError::UnsupportedContentType(
                    content_type.to_string(),
                )),
            },
        }
    }
}

impl Default for CodecTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Whether a content type carries JSON (`application/json` or a `+json`
/// suffix).
pub fn is_json(content_type: &str) -> bool {
    let key = essence(content_type);
    key == "application/json" || key.ends_with("+json")
}

/// Lowercase `type/subtype` of a content type, without parameters.
fn essence(content_type: &str) -> String {
    match content_type.trim().parse::<mime::Mime>() {
        Ok(m) => m.essence_str().to_ascii_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_cover_json_and_text() {
        let table = CodecTable::with_defaults();
        assert_eq!(
            table.coerce("application/json", br#"[1]"#).unwrap(),
            Body::Json(json!([1]))
        );
        assert_eq!(
            table.coerce("text/plain", b"hi").unwrap(),
            Body::Text("hi".into())
        );
    }

    #[test]
    fn test_lookup_ignores_parameters_and_case() {
        let table = CodecTable::with_defaults();
        assert!(table.lookup("Application/JSON; charset=utf-8").is_some());
        assert!(table.lookup("application/vnd.api+json").is_some());
        assert!(table.lookup("text/html").is_some());
        assert!(table.lookup("image/png").is_none());
    }

    #[test]
    fn test_is_json() {
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("application/cloudevents+json"));
        assert!(!is_json("text/plain"));
        assert!(!is_json("application/msgpack"));
    }

    #[test]
    fn test_permissive_passes_unknown_through() {
        let table = CodecTable::with_defaults();
        let body = table.coerce("image/png", &[0x89, 0x50]).unwrap();
        assert_eq!(body, Body::Bytes(Bytes::from_static(&[0x89, 0x50])));
        assert_eq!(
            &table.encode("image/png", &body).unwrap()[..],
            &[0x89, 0x50]
        );
    }

    #[test]
    fn test_strict_rejects_unknown() {
        let mut table = CodecTable::with_defaults();
        table.set_policy(CoercionPolicy::Strict);
        let err = table.coerce("image/png", b"x").unwrap_err();
        assert!(matches!(err, HotfnError::UnsupportedContentType(ref ct) if ct == "image/png"));
        assert!(table.encode("image/png", &Body::null()).is_err());
    }

    #[test]
    fn test_register_custom_codec() {
        fn shout_decode(data: &[u8]) -> Result<Body> {
            Ok(Body::Text(String::from_utf8_lossy(data).to_uppercase()))
        }

        let mut table = CodecTable::new(CoercionPolicy::Strict);
        table.register("text/x-shout", Codec::new(shout_decode, TextCodec::encode));
        assert_eq!(
            table.coerce("text/x-shout", b"hey").unwrap(),
            Body::Text("HEY".into())
        );
    }

    #[test]
    fn test_msgpack_entry() {
        let table = CodecTable::with_defaults();
        let packed = MsgPackCodec::encode(&json!({"data": 5})).unwrap();
        assert_eq!(
            table.coerce("application/x-msgpack", &packed).unwrap(),
            Body::Json(json!({"data": 5}))
        );
    }
}
