//! # hotfn-worker
//!
//! Rust SDK for "hot" functions: long-lived handler processes that serve
//! many invocations over a stdin/stdout pipe instead of starting once per
//! call.
//!
//! ## Architecture
//!
//! - **Inbound** (stdin): one envelope per invocation, either a JSON
//!   document `{"body": ...}` or a raw HTTP/1.x request
//! - **Outbound** (stdout): exactly one response or `{"error": ...}` frame
//!   per envelope, written whole and flushed
//! - **Diagnostics** (stderr): `tracing` output, never mixed into stdout
//!
//! Invocations are served one at a time in arrival order.
//!
//! ## Example
//!
//! ```ignore
//! use hotfn_worker::{handler::Reply, Worker};
//!
//! #[tokio::main]
//! async fn main() -> hotfn_worker::Result<()> {
//!     hotfn_worker::logging::init_tracing();
//!
//!     Worker::builder()
//!         .handler(|_ctx, data| async move { Ok(Reply::new(data)) })
//!         .build()?
//!         .run_stdio()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod transport;
pub mod writer;

mod worker;

pub use config::WorkerConfig;
pub use error::{HotfnError, Result};
pub use handler::{InvocationContext, Reply};
pub use worker::{Worker, WorkerBuilder};
