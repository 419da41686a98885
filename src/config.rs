//! Worker configuration.
//!
//! Defaults suit the JSON envelope on stdin/stdout. Every field can be set
//! through [`crate::WorkerBuilder`] or read from the environment with
//! [`WorkerConfig::from_env`]:
//!
//! | Variable | Field |
//! |---|---|
//! | `HOTFN_FORMAT` | `format` (`json`, `http`, `cloudevent`) |
//! | `HOTFN_FRAMING` | `framing` (`envelope`, `chunk`, `newline`, `length-prefixed`) |
//! | `HOTFN_CONTENT_TYPE` | `default_content_type` |
//! | `HOTFN_STRICT_CONTENT_TYPES` | `coercion_policy` (`1`/`true` = strict) |
//! | `HOTFN_MAX_FRAME_SIZE` | `max_frame_size` (bytes) |
//! | `HOTFN_CHANNEL_CAPACITY` | `channel_capacity` |
//! | `HOTFN_TIMEOUT_MS` | `handler_timeout` |
//! | `HOTFN_SUCCESS_STATUS` | `success_status` |

use std::str::FromStr;
use std::time::Duration;

use crate::codec::{CoercionPolicy, DEFAULT_CONTENT_TYPE};
use crate::error::{HotfnError, Result};
use crate::protocol::{Format, Framing, DEFAULT_MAX_FRAME_SIZE};

/// Default capacity of the inbound frame channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Runtime settings for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub format: Format,
    pub framing: Framing,
    /// Content type assumed when the envelope declares none.
    pub default_content_type: String,
    pub coercion_policy: CoercionPolicy,
    pub max_frame_size: usize,
    /// Frames buffered between the reader task and the invocation loop.
    pub channel_capacity: usize,
    pub handler_timeout: Option<Duration>,
    /// Overrides the per-format success status (JSON 202, HTTP 200).
    pub success_status: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            format: Format::Json,
            framing: Framing::Envelope,
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
            coercion_policy: CoercionPolicy::Permissive,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            handler_timeout: None,
            success_status: None,
        }
    }
}

impl WorkerConfig {
    /// Defaults overridden by `HOTFN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorkerConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("HOTFN_FORMAT") {
            config.format = v.parse()?;
        }
        if let Some(v) = lookup("HOTFN_FRAMING") {
            config.framing = v.parse()?;
        }
        if let Some(v) = lookup("HOTFN_CONTENT_TYPE").filter(|v| !v.trim().is_empty()) {
            config.default_content_type = v.trim().to_string();
        }
        if let Some(v) = lookup("HOTFN_STRICT_CONTENT_TYPES") {
            config.coercion_policy = if parse_flag("HOTFN_STRICT_CONTENT_TYPES", &v)? {
                CoercionPolicy::Strict
            } else {
                CoercionPolicy::Permissive
            };
        }
        if let Some(v) = lookup("HOTFN_MAX_FRAME_SIZE") {
            config.max_frame_size = parse_number("HOTFN_MAX_FRAME_SIZE", &v)?;
        }
        if let Some(v) = lookup("HOTFN_CHANNEL_CAPACITY") {
            config.channel_capacity = parse_number("HOTFN_CHANNEL_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("HOTFN_TIMEOUT_MS") {
            let ms: u64 = parse_number("HOTFN_TIMEOUT_MS", &v)?;
            config.handler_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(v) = lookup("HOTFN_SUCCESS_STATUS") {
            config.success_status = Some(parse_number("HOTFN_SUCCESS_STATUS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size == 0 {
            return Err(HotfnError::Config("max_frame_size must be > 0".into()));
        }
        if self.channel_capacity == 0 {
            return Err(HotfnError::Config("channel_capacity must be > 0".into()));
        }
        if let Some(status) = self.success_status {
            if !(100..=599).contains(&status) {
                return Err(HotfnError::Config(format!(
                    "success_status {} is not a valid HTTP status",
                    status
                )));
            }
        }
        Ok(())
    }

    /// Status code for a successful invocation.
    pub fn success_status(&self) -> u16 {
        self.success_status
            .unwrap_or_else(|| self.format.default_status())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HotfnError::Config(format!("{} must be a number, got {:?}", key, value)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HotfnError::Config(format!(
            "{} must be a boolean, got {:?}",
            key, value
        ))),
    }
}
