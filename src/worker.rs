//! Worker builder and runtime loop.
//!
//! The [`WorkerBuilder`] provides a fluent API for configuring the handler
//! and wire settings. The [`Worker`] then serves one pipe:
//! 1. A reader task reads the inbound stream and cuts it into frames
//! 2. Frames travel over a bounded channel to a single consumer
//! 3. The consumer runs each frame through the [`Connection`] and writes
//!    exactly one outbound frame before taking the next
//!
//! # Example
//!
//! ```ignore
//! use hotfn_worker::{handler::Reply, Worker};
//!
//! #[tokio::main]
//! async fn main() -> hotfn_worker::Result<()> {
//!     hotfn_worker::logging::init_tracing();
//!
//!     let worker = Worker::builder()
//!         .handler(|_ctx, body| async move { Ok(Reply::new(body)) })
//!         .build()?;
//!
//!     worker.run_stdio().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::codec::{Body, Codec, CodecTable, CoercionPolicy};
use crate::config::WorkerConfig;
use crate::error::{HotfnError, Result};
use crate::handler::{
    Dispatcher, FnHandler, Handler, HandlerError, HandlerResult, InvocationContext, TypedHandler,
};
use crate::protocol::{Format, Frame, FrameBuffer, Framing};
use crate::transport::{CloseReason, Connection};
use crate::writer::FrameWriter;

/// Size of the inbound read buffer.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Builder for configuring and creating a [`Worker`].
pub struct WorkerBuilder {
    handler: Option<Arc<dyn Handler>>,
    config: WorkerConfig,
    codecs: Vec<(String, Codec)>,
}

impl WorkerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            handler: None,
            config: WorkerConfig::default(),
            codecs: Vec::new(),
        }
    }

    /// Set the handler from an async function over the decoded body.
    pub fn handler<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(InvocationContext, Body) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler_impl(FnHandler::new(handler))
    }

    /// Set the handler from an async function over a deserialized input.
    ///
    /// The output is serialized to JSON and becomes the reply body.
    pub fn typed_handler<F, T, R, Fut>(self, handler: F) -> Self
    where
        F: Fn(InvocationContext, T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.handler_impl(TypedHandler::new(handler))
    }

    /// Set any [`Handler`] implementation.
    pub fn handler_impl<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set a shared handler.
    pub fn handler_arc(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the whole configuration, e.g. with [`WorkerConfig::from_env`].
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the envelope format.
    ///
    /// Default: JSON
    pub fn format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    /// Set the inbound framing.
    ///
    /// Default: [`Framing::Envelope`]
    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    /// Content type assumed when a request declares none.
    ///
    /// Default: `application/json`
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.config.default_content_type = content_type.into();
        self
    }

    /// Fail unknown content types instead of passing their bytes through.
    pub fn strict(self, strict: bool) -> Self {
        self.coercion_policy(if strict {
            CoercionPolicy::Strict
        } else {
            CoercionPolicy::Permissive
        })
    }

    pub fn coercion_policy(mut self, policy: CoercionPolicy) -> Self {
        self.config.coercion_policy = policy;
        self
    }

    /// Set the maximum inbound frame size.
    ///
    /// Default: 4 MiB
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the inbound channel capacity.
    ///
    /// Default: 16
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Fail invocations whose handler runs longer than `timeout`.
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.handler_timeout = Some(timeout);
        self
    }

    /// Override the success status code (JSON 202, HTTP 200).
    pub fn success_status(mut self, status: u16) -> Self {
        self.config.success_status = Some(status);
        self
    }

    /// Register a codec for a content type on top of the built-in ones.
    pub fn codec(mut self, content_type: &str, codec: Codec) -> Self {
        self.codecs.push((content_type.to_string(), codec));
        self
    }

    /// Validate the configuration and build the worker.
    pub fn build(self) -> Result<Worker> {
        let handler = self
            .handler
            .ok_or_else(|| HotfnError::Config("no handler registered".into()))?;
        self.config.validate()?;

        let mut codecs = CodecTable::with_defaults();
        codecs.set_policy(self.config.coercion_policy);
        for (content_type, codec) in self.codecs {
            codecs.register(&content_type, codec);
        }

        let dispatcher = Dispatcher::from_arc(handler).with_timeout(self.config.handler_timeout);

        Ok(Worker {
            config: self.config,
            codecs: Arc::new(codecs),
            dispatcher,
        })
    }
}

impl Default for WorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What the reader task hands to the consumer loop.
#[derive(Debug)]
enum Inbound {
    Frame(Frame),
    End(CloseReason),
}

/// A configured hot function worker.
///
/// Each call to [`Worker::run`] serves one pipe until its inbound side ends.
pub struct Worker {
    config: WorkerConfig,
    codecs: Arc<CodecTable>,
    dispatcher: Dispatcher,
}

impl Worker {
    /// Create a new worker builder.
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Serve stdin/stdout.
    pub async fn run_stdio(&self) -> Result<CloseReason> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one duplex pipe until the inbound stream ends or a write fails.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<CloseReason>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity);
        let frame_buffer = FrameBuffer::with_max_frame_size(
            self.config.framing,
            self.config.format,
            self.config.max_frame_size,
        );
        let reader_task = tokio::spawn(read_loop(reader, frame_buffer, tx));

        let mut connection = Connection::new(
            self.config.format,
            self.codecs.clone(),
            self.dispatcher.clone(),
            self.config.default_content_type.clone(),
            self.config.success_status(),
        );
        let mut writer = FrameWriter::new(writer, self.config.framing);

        connection.on_open();

        let reason = loop {
            match rx.recv().await {
                Some(Inbound::Frame(frame)) => {
                    let out = connection.on_data(frame).await?;
                    if let Err(e) = writer.write_frame(&out).await {
                        error!("Failed to write response: {}", e);
                        break CloseReason::WriteError(e.to_string());
                    }
                }
                Some(Inbound::End(reason)) => break reason,
                None => break CloseReason::Eof,
            }
        };

        reader_task.abort();
        connection.on_close(&reason);

        debug!(frames = writer.frames_written(), "Outbound stream finished");
        if let Err(e) = writer.shutdown().await {
            debug!("Outbound shutdown failed: {}", e);
        }

        Ok(reason)
    }
}

/// Read the inbound stream, cut it into frames and forward them in order.
async fn read_loop<R>(mut reader: R, mut frame_buffer: FrameBuffer, tx: mpsc::Sender<Inbound>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let reason = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                if !frame_buffer.is_empty() {
                    debug!(buffered = frame_buffer.len(), "Inbound stream ended mid-frame");
                }
                if let Some(frame) = frame_buffer.finish() {
                    debug!("Delivering trailing frame at EOF");
                    if tx.send(Inbound::Frame(frame)).await.is_err() {
                        return;
                    }
                }
                break CloseReason::Eof;
            }
            Ok(n) => n,
            Err(e) => {
                error!("Read error: {}", e);
                break CloseReason::ReadError(e.to_string());
            }
        };

        for frame in frame_buffer.push(&buf[..n]) {
            // Receiver gone: the consumer stopped after a write failure.
            if tx.send(Inbound::Frame(frame)).await.is_err() {
                return;
            }
        }
    };

    let _ = tx.send(Inbound::End(reason)).await;
}
