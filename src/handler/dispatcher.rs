//! Handler trait and dispatcher.
//!
//! The user handler is any async function of `(InvocationContext, Body)`
//! returning a [`Reply`] or a [`HandlerError`]. [`Dispatcher::invoke`] runs
//! it exactly once in its own task, so a panic or an overrun deadline is
//! turned into [`HotfnError::Handler`] instead of taking the worker down.
//!
//! # Example
//!
//! ```
//! use hotfn_worker::codec::Body;
//! use hotfn_worker::handler::{Dispatcher, FnHandler, InvocationContext, Reply};
//! use hotfn_worker::protocol::Format;
//!
//! # tokio_test_block_on(async {
//! let dispatcher = Dispatcher::new(FnHandler::new(|_ctx, body: Body| async move {
//!     Ok(Reply::new(body))
//! }));
//! let ctx = InvocationContext::new(Format::Json, "application/json");
//! let reply = dispatcher.invoke(ctx, Body::from("hi")).await.unwrap();
//! assert_eq!(reply.body, Body::from("hi"));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::{InvocationContext, Reply};
use crate::codec::Body;
use crate::error::{HotfnError, Result};

/// Failure raised by a user handler. Its message is reported verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::new(err.to_string())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::new(err.to_string())
    }
}

impl From<HotfnError> for HandlerError {
    fn from(err: HotfnError) -> Self {
        HandlerError::new(err.message())
    }
}

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Reply, HandlerError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle one invocation.
    fn call(&self, ctx: InvocationContext, body: Body) -> BoxFuture<'static, HandlerResult>;
}

/// Handler over the raw decoded [`Body`].
pub struct FnHandler<F, Fut>
where
    F: Fn(InvocationContext, Body) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(InvocationContext, Body) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(InvocationContext, Body) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: InvocationContext, body: Body) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(ctx, body))
    }
}

/// Wrapper that deserializes the JSON body before calling the handler and
/// serializes its output as the reply body.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(InvocationContext, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> (R, Fut)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(InvocationContext, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(InvocationContext, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    fn call(&self, ctx: InvocationContext, body: Body) -> BoxFuture<'static, HandlerResult> {
        let input: T = match body.to_json_value().and_then(|v| Ok(serde_json::from_value(v)?)) {
            Ok(v) => v,
            Err(e) => {
                let err = HandlerError::new(e.message());
                return Box::pin(async move { Err(err) });
            }
        };

        let fut = (self.handler)(ctx, input);
        Box::pin(async move {
            let output = fut.await?;
            Reply::json(&output)
        })
    }
}

/// Runs the user handler for one invocation at a time.
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn Handler>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new<H: Handler>(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    pub fn from_arc(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            timeout: None,
        }
    }

    /// Fail invocations that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invoke the handler once.
    ///
    /// Handler errors, panics and timeouts all come back as
    /// [`HotfnError::Handler`]. There are no retries.
    pub async fn invoke(&self, ctx: InvocationContext, body: Body) -> Result<Reply> {
        let mut task = tokio::spawn(self.handler.call(ctx, body));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    return Err(HotfnError::Handler(format!(
                        "handler timed out after {:?}",
                        limit
                    )));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(HotfnError::Handler(e.message)),
            Err(e) if e.is_panic() => Err(HotfnError::Handler(format!(
                "handler panicked: {}",
                panic_message(e.into_panic())
            ))),
            Err(e) => Err(HotfnError::Handler(e.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
