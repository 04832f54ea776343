//! Tracer configuration
//!
//! Configuration is read once, when a component initializes. The environment
//! is the normal source; hosts and tests can pin a [`TraceConfig`] instead
//! through [`ConfigSource::Fixed`].
//!
//! | Variable            | Effect                                            |
//! |---------------------|---------------------------------------------------|
//! | `TRACE_DEPTH`       | stack depth (>0 registry, >1 call-graph inference) |
//! | `TRACE_ALL`         | trace paths the filter would skip                 |
//! | `TRACE_ENTRYPOINT`  | endpoint URL, selects the network transport       |
//! | `TRACE_OUTPUT_DIR`  | directory for `func_<pid>.tsv` / `cg_<pid>.tsv`   |
//! | `TRACE_BUFFER_SIZE` | serializer buffer capacity in bytes               |
//! | `TRACE_TIMEOUT_MS`  | network connect/read/write timeout                |
//!
//! Malformed values never fail initialization: they fall back to defaults
//! with a warning.
//!
//! Two values read differently from older tracers that took any set variable
//! at face value:
//!
//! - `TRACE_ALL` is off when empty, `0` or `false` (any case); any other value
//!   turns it on.
//! - A negative `TRACE_DEPTH` means 0 (markers only) instead of wrapping to a
//!   huge depth.
//!
//! `TRACE_BUFFER_SIZE` is clamped to [`MIN_CAPACITY`]..=[`MAX_CAPACITY`].

use crate::record_buffer::{DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_TRACE_DEPTH: &str = "TRACE_DEPTH";
pub const ENV_TRACE_ALL: &str = "TRACE_ALL";
pub const ENV_TRACE_ENTRYPOINT: &str = "TRACE_ENTRYPOINT";
pub const ENV_TRACE_OUTPUT_DIR: &str = "TRACE_OUTPUT_DIR";
pub const ENV_TRACE_BUFFER_SIZE: &str = "TRACE_BUFFER_SIZE";
pub const ENV_TRACE_TIMEOUT_MS: &str = "TRACE_TIMEOUT_MS";

/// Default stack depth
pub const DEFAULT_STACK_DEPTH: u32 = 100;

/// Default network timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// File name prefix of the definition stream
pub const FUNCTION_FILE_PREFIX: &str = "func_";

/// File name prefix of the call stream
pub const CALL_GRAPH_FILE_PREFIX: &str = "cg_";

/// Errors found while interpreting configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Endpoint has no host: {0:?}")]
    EmptyHost(String),
}

/// Settings shared by the registry and the call-graph tracer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Stack depth; selects registry and call-graph inference
    pub stack_depth: u32,
    /// Trace every path, bypassing the path filter
    pub trace_all: bool,
    /// Endpoint URL; `None` selects the file transport
    pub entrypoint: Option<String>,
    /// Directory receiving trace files
    pub output_dir: PathBuf,
    /// Serializer buffer capacity in bytes
    pub buffer_capacity: usize,
    /// Network connect/read/write timeout
    pub timeout: Duration,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            stack_depth: DEFAULT_STACK_DEPTH,
            trace_all: false,
            entrypoint: None,
            output_dir: PathBuf::from("."),
            buffer_capacity: DEFAULT_CAPACITY,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl TraceConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_TRACE_DEPTH) {
            match parse_depth(&value) {
                Ok(depth) => config.stack_depth = depth,
                Err(e) => tracing::warn!("{}; using default {}", e, DEFAULT_STACK_DEPTH),
            }
        }

        config.trace_all = lookup(ENV_TRACE_ALL).map_or(false, |v| parse_flag(&v));

        config.entrypoint = lookup(ENV_TRACE_ENTRYPOINT)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if let Some(dir) = lookup(ENV_TRACE_OUTPUT_DIR).filter(|v| !v.is_empty()) {
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(value) = lookup(ENV_TRACE_BUFFER_SIZE) {
            match parse_number(ENV_TRACE_BUFFER_SIZE, &value) {
                Ok(size) => config.buffer_capacity = clamp_capacity(size),
                Err(e) => tracing::warn!("{}; using default {}", e, DEFAULT_CAPACITY),
            }
        }

        if let Some(value) = lookup(ENV_TRACE_TIMEOUT_MS) {
            match parse_number(ENV_TRACE_TIMEOUT_MS, &value) {
                Ok(ms) => config.timeout = Duration::from_millis(ms),
                Err(e) => tracing::warn!("{}; using default {}ms", e, DEFAULT_TIMEOUT_MS),
            }
        }

        config
    }

    pub fn with_stack_depth(mut self, depth: u32) -> Self {
        self.stack_depth = depth;
        self
    }

    pub fn with_trace_all(mut self, trace_all: bool) -> Self {
        self.trace_all = trace_all;
        self
    }

    pub fn with_entrypoint(mut self, url: impl Into<String>) -> Self {
        self.entrypoint = Some(url.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = clamp_capacity(capacity as u64);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<output_dir>/<prefix><pid>.tsv`
    pub fn output_path(&self, prefix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.tsv", prefix, std::process::id()))
    }
}

/// Where a component gets its configuration at initialization time
#[derive(Debug, Clone, Default)]
pub enum ConfigSource {
    /// Read the process environment on first use
    #[default]
    Environment,
    /// Use the given configuration
    Fixed(TraceConfig),
}

impl ConfigSource {
    pub fn resolve(&self) -> TraceConfig {
        match self {
            ConfigSource::Environment => TraceConfig::from_env(),
            ConfigSource::Fixed(config) => config.clone(),
        }
    }
}

/// Parse a stack depth; negatives clamp to 0, huge values to `u32::MAX`
pub fn parse_depth(value: &str) -> Result<u32, ConfigError> {
    let depth: i64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var: ENV_TRACE_DEPTH,
            value: value.to_string(),
        })?;
    Ok(depth.clamp(0, i64::from(u32::MAX)) as u32)
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
}

/// Any value other than empty, `0` or `false` enables a flag
fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

fn clamp_capacity(size: u64) -> usize {
    let size = usize::try_from(size).unwrap_or(usize::MAX);
    if size > MAX_CAPACITY {
        tracing::warn!(
            "{} of {} bytes exceeds the limit; using {}",
            ENV_TRACE_BUFFER_SIZE,
            size,
            MAX_CAPACITY
        );
    }
    size.clamp(MIN_CAPACITY, MAX_CAPACITY)
}
