//! Error types for hotfn-worker.

use thiserror::Error;

/// Main error type for all worker operations.
#[derive(Debug, Error)]
pub enum HotfnError {
    /// I/O error on the inbound or outbound pipe.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed envelope or body.
    #[error("{0}")]
    Decode(String),

    /// No codec registered for the content type and the policy is strict.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The user handler failed, panicked or timed out.
    #[error("{0}")]
    Handler(String),

    /// The handler result could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(String),

    /// Inbound frame exceeds the configured maximum.
    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Connection already closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of a failure, as reported back across the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    UnsupportedContentType,
    Handler,
    Encode,
    Transport,
}

impl HotfnError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HotfnError::Json(e) if e.is_io() => ErrorKind::Transport,
            HotfnError::Json(_) | HotfnError::MsgPackDecode(_) | HotfnError::Decode(_) => {
                ErrorKind::Decode
            }
            HotfnError::FrameTooLarge { .. } => ErrorKind::Decode,
            HotfnError::UnsupportedContentType(_) => ErrorKind::UnsupportedContentType,
            HotfnError::Handler(_) => ErrorKind::Handler,
            HotfnError::MsgPackEncode(_) | HotfnError::Encode(_) => ErrorKind::Encode,
            HotfnError::Io(_) | HotfnError::ConnectionClosed | HotfnError::Config(_) => {
                ErrorKind::Transport
            }
        }
    }

    /// Text placed into the `error.message` field of an error payload.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Shorthand for a decode failure.
    pub fn decode(message: impl Into<String>) -> Self {
        HotfnError::Decode(message.into())
    }
}

/// Result type alias using HotfnError.
pub type Result<T> = std::result::Result<T, HotfnError>;
