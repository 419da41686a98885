//! Transport module - connection lifecycle over a duplex pipe.
//!
//! Provides:
//! - [`Connection`] - `on_open` / `on_data` / `on_close` event handling
//! - [`ConnectionState`] - lifecycle position
//! - [`CloseReason`] - why the pipe ended

mod connection;

pub use connection::{CloseReason, Connection, ConnectionState};
