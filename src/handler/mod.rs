//! Handler module - the user handler seam and its dispatch.
//!
//! Provides:
//! - [`Handler`] - the capability a hot function implements
//! - [`FnHandler`] / [`TypedHandler`] - adapters from async closures
//! - [`Dispatcher`] - runs the handler once per invocation
//! - [`InvocationContext`] - metadata handed to the handler
//! - [`Reply`] - what a handler returns on success
//!
//! # Example
//!
//! ```
//! use hotfn_worker::handler::{HandlerError, TypedHandler};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Input {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Output {
//!     message: String,
//! }
//!
//! let _handler = TypedHandler::new(|_ctx, input: Input| async move {
//!     if input.name.is_empty() {
//!         return Err(HandlerError::new("name is required"));
//!     }
//!     Ok(Output { message: format!("Hello {}", input.name) })
//! });
//! ```

mod context;
mod dispatcher;
mod reply;

pub use context::InvocationContext;
pub use dispatcher::{
    BoxFuture, Dispatcher, FnHandler, Handler, HandlerError, HandlerResult, TypedHandler,
};
pub use reply::Reply;
