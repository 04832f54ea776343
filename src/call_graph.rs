//! Call-graph reconstruction from the live call stack
//!
//! The engine reports every call entry with the callee's [`FunctionId`] and
//! a top-down view of the stack. From that alone the tracer infers who called
//! whom.
//!
//! # Modes
//!
//! With stack inference off (depth <= 1) every entry is written as
//! `(NONE, callee)` and every exit as `(callee, NONE)`; consumers replay the
//! sequence to rebuild edges. Nothing is deduplicated.
//!
//! With stack inference on, each entry walks the stack:
//!
//! ```text
//! level 0   callee frame   remember frame -> callee
//!                          collect callable arguments (pending callbacks)
//!                          if this function was handed over as a callback,
//!                          emit (registrant -> callee)
//! level 1.. ancestors      first frame with a known function is the caller
//! ```
//!
//! Untraced frames (filtered paths, engine dispatch code) are skipped, so the
//! nearest traced ancestor wins. The walk runs to the bottom of the stack if
//! needed; the configured depth only switches the mode. Each `(caller, callee)` pair is written once.
//!
//! # Callbacks
//!
//! A function passed as an argument is often invoked later by code that has
//! nothing to do with the call site (timers, event emitters, promise jobs).
//! When a traced call resolves its caller, every callable argument of the
//! callee frame is recorded as registered by that caller. When the callback
//! eventually runs, the edge is attributed to the registrant instead of the
//! incidental invoker.
//!
//! # Identity
//!
//! Frames are keyed by [`FunctionKey`]. Entries are never aged out; a host
//! that can observe function death should call
//! [`CallGraphTracer::forget_function`] so a reused address cannot inherit a
//! stale correlation.

use crate::config::{ConfigSource, CALL_GRAPH_FILE_PREFIX};
use crate::host::{FrameArgument, FunctionKey, StackFrame};
use crate::records::{now_ms, FunctionCall, FunctionId};
use crate::serializer::{Serializer, SerializerStats};
use crate::transport::Transport;
use fnv::{FnvHashMap, FnvHashSet};
use std::sync::OnceLock;

#[derive(Debug)]
struct CallGraphState {
    serializer: Serializer,
    collect_stack: bool,
    /// Edges already written (stack mode only)
    known_calls: FnvHashSet<(FunctionId, FunctionId)>,
    /// Function running in a frame -> its id
    address_to_func: FnvHashMap<FunctionKey, FunctionId>,
    /// Callback function -> id of the function that registered it
    callback_to_func: FnvHashMap<FunctionKey, FunctionId>,
    /// Scratch list reused across calls
    pending_callbacks: Vec<FunctionKey>,
}

impl CallGraphState {
    fn emit_once(&mut self, call: FunctionCall) {
        if self.known_calls.insert(call.edge()) {
            tracing::trace!(caller = %call.caller, callee = %call.callee, "new call edge");
            self.serializer.serialize_function_call(&call);
        }
    }
}

/// Call-graph tracer
#[derive(Debug, Default)]
pub struct CallGraphTracer {
    config: ConfigSource,
    /// Transport override used instead of the configured one
    transport: Option<Transport>,
    state: OnceLock<CallGraphState>,
}

impl CallGraphTracer {
    pub fn new(config: ConfigSource) -> Self {
        Self {
            config,
            transport: None,
            state: OnceLock::new(),
        }
    }

    /// Tracer writing to `transport` instead of the configured destination
    pub fn with_transport(config: ConfigSource, transport: Transport) -> Self {
        Self {
            config,
            transport: Some(transport),
            state: OnceLock::new(),
        }
    }

    /// One-time setup; stack inference is enabled when `stack_depth > 1`
    ///
    /// Later calls are no-ops, whatever depth they pass.
    pub fn initialize(&mut self, stack_depth: u32) {
        if self.state.get().is_some() {
            return;
        }
        let config = self.config.resolve();
        let transport = self
            .transport
            .take()
            .unwrap_or_else(|| Transport::from_config(&config, CALL_GRAPH_FILE_PREFIX));
        let collect_stack = stack_depth > 1;
        tracing::debug!(
            stack_depth,
            collect_stack,
            transport = transport.kind(),
            "call-graph tracer initialized"
        );
        let state = CallGraphState {
            serializer: Serializer::new(transport, config.buffer_capacity),
            collect_stack,
            known_calls: FnvHashSet::default(),
            address_to_func: FnvHashMap::default(),
            callback_to_func: FnvHashMap::default(),
            pending_callbacks: Vec::new(),
        };
        // Unset: checked above and `&mut self` excludes other initializers.
        let _ = self.state.set(state);
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Whether stack inference is on
    pub fn collects_stack(&self) -> bool {
        self.state.get().map_or(false, |s| s.collect_stack)
    }

    /// Record entry into `callee`
    ///
    /// `stack` yields the live frames top-down, starting with the callee's
    /// own frame. It is only consumed in stack mode, and at most
    /// `stack_depth` frames are looked at.
    pub fn trace_enter<I>(&mut self, callee: FunctionId, stack: I)
    where
        I: IntoIterator,
        I::Item: StackFrame,
    {
        if callee.is_none() {
            return;
        }
        let Some(state) = self.state.get_mut() else {
            return;
        };
        let now = now_ms();

        if !state.collect_stack {
            state
                .serializer
                .serialize_function_call(&FunctionCall::entry(callee, now));
            return;
        }

        state.pending_callbacks.clear();
        let mut caller = FunctionId::NONE;

        for (level, frame) in stack.into_iter().enumerate() {
            let key = frame.function_key();
            if level == 0 {
                state.address_to_func.insert(key, callee);
                for index in 0..frame.argument_count() {
                    if let FrameArgument::Callable(callback) = frame.argument(index) {
                        state.pending_callbacks.push(callback);
                    }
                }
                // Invoked as a previously registered callback.
                if let Some(&registrant) = state.callback_to_func.get(&key) {
                    state.emit_once(FunctionCall::new(registrant, callee, now));
                }
            } else if let Some(&id) = state.address_to_func.get(&key) {
                caller = id;
                break;
            }
        }

        if caller.is_none() {
            return;
        }

        state.emit_once(FunctionCall::new(caller, callee, now));
        for &callback in &state.pending_callbacks {
            state.callback_to_func.insert(callback, caller);
        }
    }

    /// Record exit from `callee`; only written when stack inference is off
    pub fn trace_exit(&mut self, callee: FunctionId) {
        if callee.is_none() {
            return;
        }
        let Some(state) = self.state.get_mut() else {
            return;
        };
        if state.collect_stack {
            return;
        }
        state
            .serializer
            .serialize_function_call(&FunctionCall::exit(callee, now_ms()));
    }

    /// Drop every correlation held for `key`
    ///
    /// Call when the function object behind `key` is destroyed. Returns true
    /// if anything was removed.
    pub fn forget_function(&mut self, key: FunctionKey) -> bool {
        let Some(state) = self.state.get_mut() else {
            return false;
        };
        let frame = state.address_to_func.remove(&key).is_some();
        let callback = state.callback_to_func.remove(&key).is_some();
        frame || callback
    }

    /// Push buffered records to the transport
    pub fn flush(&mut self) {
        if let Some(state) = self.state.get_mut() {
            state.serializer.flush();
        }
    }

    pub fn stats(&self) -> SerializerStats {
        self.state
            .get()
            .map(|s| s.serializer.stats())
            .unwrap_or_default()
    }

    /// Distinct edges written so far (stack mode)
    pub fn known_edge_count(&self) -> usize {
        self.state.get().map_or(0, |s| s.known_calls.len())
    }

    /// Function identities currently mapped to an id
    pub fn tracked_function_count(&self) -> usize {
        self.state.get().map_or(0, |s| s.address_to_func.len())
    }

    /// Callbacks waiting to be attributed to their registrant
    pub fn registered_callback_count(&self) -> usize {
        self.state.get().map_or(0, |s| s.callback_to_func.len())
    }
}
