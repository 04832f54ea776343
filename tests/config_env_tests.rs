//! Environment-driven configuration
//!
//! These tests mutate the process environment and therefore run serially.

use cgtrace::config::{
    TraceConfig, ENV_TRACE_ALL, ENV_TRACE_BUFFER_SIZE, ENV_TRACE_DEPTH, ENV_TRACE_ENTRYPOINT,
    ENV_TRACE_OUTPUT_DIR, ENV_TRACE_TIMEOUT_MS, FUNCTION_FILE_PREFIX,
};
use cgtrace::context::TracerContext;
use cgtrace::host::{LiteralInfo, SourceScript};
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;

const ALL_VARS: [&str; 6] = [
    ENV_TRACE_DEPTH,
    ENV_TRACE_ALL,
    ENV_TRACE_ENTRYPOINT,
    ENV_TRACE_OUTPUT_DIR,
    ENV_TRACE_BUFFER_SIZE,
    ENV_TRACE_TIMEOUT_MS,
];

/// Clears the tracing variables on creation and again on drop
struct EnvGuard;

impl EnvGuard {
    fn new() -> Self {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
        EnvGuard
    }

    fn set(&self, var: &str, value: &str) {
        std::env::set_var(var, value);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    let _env = EnvGuard::new();
    assert_eq!(TraceConfig::from_env(), TraceConfig::default());
}

#[test]
#[serial]
fn test_from_env_reads_every_variable() {
    let env = EnvGuard::new();
    env.set(ENV_TRACE_DEPTH, "7");
    env.set(ENV_TRACE_ALL, "1");
    env.set(ENV_TRACE_ENTRYPOINT, "http://collector:9000/ingest");
    env.set(ENV_TRACE_OUTPUT_DIR, "/tmp/traces");
    env.set(ENV_TRACE_BUFFER_SIZE, "4096");
    env.set(ENV_TRACE_TIMEOUT_MS, "250");

    let config = TraceConfig::from_env();
    assert_eq!(config.stack_depth, 7);
    assert!(config.trace_all);
    assert_eq!(config.entrypoint.as_deref(), Some("http://collector:9000/ingest"));
    assert_eq!(config.output_dir, std::path::PathBuf::from("/tmp/traces"));
    assert_eq!(config.buffer_capacity, 4096);
    assert_eq!(config.timeout, Duration::from_millis(250));
}

#[test]
#[serial]
fn test_from_env_permissive_fallbacks() {
    let env = EnvGuard::new();
    env.set(ENV_TRACE_DEPTH, "deep");
    env.set(ENV_TRACE_BUFFER_SIZE, "16");
    env.set(ENV_TRACE_ALL, "false");
    env.set(ENV_TRACE_ENTRYPOINT, "   ");

    let config = TraceConfig::from_env();
    assert_eq!(config.stack_depth, 100);
    assert_eq!(config.buffer_capacity, 256);
    assert!(!config.trace_all);
    assert!(config.entrypoint.is_none());

    env.set(ENV_TRACE_DEPTH, "-3");
    assert_eq!(TraceConfig::from_env().stack_depth, 0);
}

#[test]
#[serial]
fn test_context_reads_environment_on_first_use() {
    let env = EnvGuard::new();
    let dir = TempDir::new().unwrap();
    let mut tracer = TracerContext::from_env();

    // Set after construction: only initialization reads the environment.
    env.set(ENV_TRACE_OUTPUT_DIR, dir.path().to_str().unwrap());
    env.set(ENV_TRACE_DEPTH, "0");

    let script = SourceScript::new("/app/index.js", "");
    let id = tracer.trace_function_creation(&script, &LiteralInfo::new(1, 0, 1), false);
    assert!(id.is_some());
    assert_eq!(tracer.registry().stack_depth(), Some(0));
    assert!(!tracer.call_graph().collects_stack());

    // Later changes are not observed.
    env.set(ENV_TRACE_DEPTH, "50");
    tracer.trace_function_creation(&script, &LiteralInfo::new(2, 0, 1), false);
    assert_eq!(tracer.registry().stack_depth(), Some(0));
    tracer.shutdown();

    let expected = TraceConfig::default()
        .with_output_dir(dir.path())
        .output_path(FUNCTION_FILE_PREFIX);
    let contents = std::fs::read_to_string(expected).unwrap();
    assert_eq!(contents.lines().count(), 2);
}
