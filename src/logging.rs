//! Diagnostic logging.
//!
//! stdout carries response frames, so the subscriber installed here writes
//! to stderr only. The filter comes from `HOTFN_LOG`, then `RUST_LOG`,
//! defaulting to `info`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "HOTFN_LOG";

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(filter_var())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn filter_var() -> &'static str {
    if std::env::var_os(LOG_ENV).is_some() {
        LOG_ENV
    } else {
        EnvFilter::DEFAULT_ENV
    }
}
