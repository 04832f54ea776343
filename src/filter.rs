//! Source path filtering for function registration
//!
//! Decides which scripts get traced. Runtime-internal scripts (`node:` prefix)
//! and tooling directories (TypeScript compilers, source-map shims, the
//! package manager) add noise without telling anything about the program, so
//! they are skipped unless tracing of everything is forced.
//!
//! Rules are plain prefix/substring checks evaluated on every registration.

/// Prefix of runtime-internal scripts
pub const INTERNAL_PREFIX: &str = "node:";

/// Internal scripts traced despite [`INTERNAL_PREFIX`] (timers dispatch
/// user callbacks)
pub const ALLOWED_INTERNAL_PREFIXES: &[&str] = &["node:timers"];

/// Path fragments of tooling that is never traced
pub const DENIED_FRAGMENTS: &[&str] = &[
    "/ts-node/",
    "/typescript/",
    "/npm/",
    "/source-map-support/",
];

/// Path filter that determines which scripts to trace
#[derive(Debug, Clone, Copy, Default)]
pub struct PathFilter {
    trace_all: bool,
}

impl PathFilter {
    /// Create a filter; `trace_all` bypasses every rule
    pub fn new(trace_all: bool) -> Self {
        Self { trace_all }
    }

    /// Create a filter that traces every path
    pub fn all() -> Self {
        Self::new(true)
    }

    pub fn traces_all(&self) -> bool {
        self.trace_all
    }

    /// Check if functions from `path` should be traced
    pub fn should_trace(&self, path: &str) -> bool {
        if self.trace_all {
            return true;
        }
        let internal_allowed = !path.starts_with(INTERNAL_PREFIX)
            || ALLOWED_INTERNAL_PREFIXES
                .iter()
                .any(|prefix| path.starts_with(prefix));
        internal_allowed
            && !DENIED_FRAGMENTS
                .iter()
                .any(|fragment| path.contains(fragment))
    }
}
