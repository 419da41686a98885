//! Echo hot function.
//!
//! Reads envelopes from stdin and answers each with the data it was sent.
//! Settings come from `HOTFN_*` environment variables, e.g.
//!
//! ```text
//! echo '{"body": "{\"data\": 42}"}' | cargo run --example echo
//! HOTFN_FORMAT=http cargo run --example echo < request.http
//! ```

use hotfn_worker::handler::HandlerError;
use hotfn_worker::{Reply, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> hotfn_worker::Result<()> {
    hotfn_worker::logging::init_tracing();

    let worker = Worker::builder()
        .config(WorkerConfig::from_env()?)
        .handler(|ctx, data| async move {
            if ctx.header("Fn-Fail").is_some() {
                return Err(HandlerError::new("asked to fail"));
            }
            tracing::debug!(sequence = ctx.sequence(), "echoing");
            Ok(Reply::new(data))
        })
        .build()?;

    let reason = worker.run_stdio().await?;
    tracing::info!(%reason, "echo finished");
    Ok(())
}
