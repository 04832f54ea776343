//! Tracer context: the object an engine embeds at its call boundary
//!
//! Owns the definition registry and the call-graph tracer and wires them
//! together. The host creates one context at startup and passes it to every
//! instrumentation point:
//!
//! ```no_run
//! use cgtrace::context::TracerContext;
//! use cgtrace::host::{FrameSnapshot, FunctionKey, LiteralInfo, SourceScript};
//!
//! let mut tracer = TracerContext::from_env();
//!
//! // Function materialization: keep the returned id with the function.
//! let script = SourceScript::new("/app/index.js", "function main() {}");
//! let id = tracer.trace_function_creation(&script, &LiteralInfo::new(1, 0, 18), false);
//!
//! // Call entry and exit.
//! let stack = [FrameSnapshot::new(FunctionKey::from_address(0x1000))];
//! tracer.trace_enter(id, &stack);
//! tracer.trace_exit(id);
//!
//! // Dropping the context flushes both streams.
//! drop(tracer);
//! ```
//!
//! # Threading
//!
//! Tracing methods take `&mut self`: the context serves one logical call
//! stream. A multi-threaded host must serialize access itself (for instance by
//! keeping one context per isolate). Each component initializes itself once,
//! on first use, reading configuration at that moment.

use crate::call_graph::CallGraphTracer;
use crate::config::{ConfigSource, TraceConfig};
use crate::host::{FunctionKey, FunctionLiteral, Script, StackFrame};
use crate::records::FunctionId;
use crate::registry::DefinitionRegistry;
use crate::serializer::SerializerStats;
use crate::transport::Transport;

/// Serializer counters of both streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracerStats {
    pub definitions: SerializerStats,
    pub calls: SerializerStats,
}

/// Registry and call-graph tracer bound together
#[derive(Debug, Default)]
pub struct TracerContext {
    registry: DefinitionRegistry,
    call_graph: CallGraphTracer,
}

impl TracerContext {
    /// Context reading the environment on first use
    pub fn from_env() -> Self {
        Self::new(ConfigSource::Environment)
    }

    /// Context with a fixed configuration
    pub fn with_config(config: TraceConfig) -> Self {
        Self::new(ConfigSource::Fixed(config))
    }

    pub fn new(config: ConfigSource) -> Self {
        Self {
            registry: DefinitionRegistry::new(config.clone()),
            call_graph: CallGraphTracer::new(config),
        }
    }

    /// Context with explicit transports for the definition and call streams
    pub fn with_transports(config: TraceConfig, definitions: Transport, calls: Transport) -> Self {
        let source = ConfigSource::Fixed(config);
        Self {
            registry: DefinitionRegistry::with_transport(source.clone(), definitions),
            call_graph: CallGraphTracer::with_transport(source, calls),
        }
    }

    /// Register a function the engine is about to materialize
    ///
    /// Returns the id to pass to [`trace_enter`](Self::trace_enter) and
    /// [`trace_exit`](Self::trace_exit), or [`FunctionId::NONE`] when the
    /// function is not traced.
    pub fn trace_function_creation<S, L>(
        &mut self,
        script: &S,
        literal: &L,
        is_constructor: bool,
    ) -> FunctionId
    where
        S: Script + ?Sized,
        L: FunctionLiteral + ?Sized,
    {
        let id = self
            .registry
            .register_or_lookup(script, literal, is_constructor);
        self.ensure_call_graph();
        id
    }

    /// Id of an already registered function, without registering it
    pub fn lookup_function<S, L>(&self, script: &S, literal: &L) -> FunctionId
    where
        S: Script + ?Sized,
        L: FunctionLiteral + ?Sized,
    {
        self.registry.lookup_only(script, literal)
    }

    /// Record entry into `callee`; `stack` is the live stack, top first
    pub fn trace_enter<I>(&mut self, callee: FunctionId, stack: I)
    where
        I: IntoIterator,
        I::Item: StackFrame,
    {
        self.call_graph.trace_enter(callee, stack);
    }

    /// Record exit from `callee`
    pub fn trace_exit(&mut self, callee: FunctionId) {
        self.call_graph.trace_exit(callee);
    }

    /// Forget correlations tied to a destroyed function object
    pub fn forget_function(&mut self, key: FunctionKey) -> bool {
        self.call_graph.forget_function(key)
    }

    /// Push both streams to their transports
    pub fn flush(&mut self) {
        self.registry.flush();
        self.call_graph.flush();
    }

    pub fn stats(&self) -> TracerStats {
        TracerStats {
            definitions: self.registry.stats(),
            calls: self.call_graph.stats(),
        }
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn call_graph(&self) -> &CallGraphTracer {
        &self.call_graph
    }

    /// Flush and release both streams
    pub fn shutdown(self) {
        tracing::debug!(stats = ?self.stats(), "tracer shutting down");
        drop(self);
    }

    /// The call graph follows the registry's depth once the registry is up
    fn ensure_call_graph(&mut self) {
        if self.call_graph.is_initialized() {
            return;
        }
        if let Some(depth) = self.registry.stack_depth() {
            self.call_graph.initialize(depth);
        }
    }
}
