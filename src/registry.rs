//! Function definition registry
//!
//! Assigns a dense [`FunctionId`] to every traceable function the first time
//! the engine materializes it and writes one definition record for it. The
//! engine stores the returned id and hands it back on every call, so the
//! call-graph tracer never has to look functions up by name.
//!
//! Identity is the `(literal id, script path)` pair: re-materializing the same
//! literal (a closure created in a loop, a lazily recompiled function) yields
//! the same id and no new record. The mapping only ever grows.
//!
//! Initialization is lazy and happens once, on the first registration: the
//! configuration is resolved then, and the definition stream
//! (`func_<pid>.tsv` or the endpoint) is opened.

use crate::config::{ConfigSource, TraceConfig, FUNCTION_FILE_PREFIX};
use crate::filter::PathFilter;
use crate::host::{FunctionLiteral, Script};
use crate::records::{now_ms, FunctionDef, FunctionId, NO_SOURCE_POSITION};
use crate::serializer::{Serializer, SerializerStats};
use crate::transport::Transport;
use fnv::FnvHashMap;
use std::sync::OnceLock;

/// Literal id of a script's top-level body, which is never traced
const TOP_LEVEL_LITERAL: i32 = 0;

/// Resolved position of a literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FunctionPosition {
    start: i32,
    end: i32,
    line: i32,
    column: i32,
}

/// State created by initialization
#[derive(Debug)]
struct RegistryState {
    serializer: Serializer,
    filter: PathFilter,
    stack_depth: u32,
    stack_collect: bool,
    /// path -> literal id -> function id
    functions: FnvHashMap<String, FnvHashMap<i32, FunctionId>>,
    next_id: u32,
}

impl RegistryState {
    fn new(config: &TraceConfig, transport: Transport) -> Self {
        tracing::debug!(
            stack_depth = config.stack_depth,
            trace_all = config.trace_all,
            transport = transport.kind(),
            "definition registry initialized"
        );
        Self {
            serializer: Serializer::new(transport, config.buffer_capacity),
            filter: PathFilter::new(config.trace_all),
            stack_depth: config.stack_depth,
            stack_collect: config.stack_depth > 0,
            functions: FnvHashMap::default(),
            next_id: 0,
        }
    }

    fn lookup(&self, path: &str, literal_id: i32) -> Option<FunctionId> {
        self.functions.get(path)?.get(&literal_id).copied()
    }

    /// Next id, or `None` once the id space is exhausted
    fn allocate(&mut self) -> Option<FunctionId> {
        let id = FunctionId::new(self.next_id);
        if id.is_none() {
            return None;
        }
        self.next_id += 1;
        Some(id)
    }
}

/// Registry of traced function definitions
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    config: ConfigSource,
    /// Transport override used instead of the configured one
    transport: Option<Transport>,
    state: OnceLock<RegistryState>,
}

impl DefinitionRegistry {
    pub fn new(config: ConfigSource) -> Self {
        Self {
            config,
            transport: None,
            state: OnceLock::new(),
        }
    }

    /// Registry writing to `transport` instead of the configured destination
    pub fn with_transport(config: ConfigSource, transport: Transport) -> Self {
        Self {
            config,
            transport: Some(transport),
            state: OnceLock::new(),
        }
    }

    /// One-time setup; later calls are no-ops
    pub fn initialize(&mut self) {
        if self.state.get().is_some() {
            return;
        }
        let config = self.config.resolve();
        let transport = self
            .transport
            .take()
            .unwrap_or_else(|| Transport::from_config(&config, FUNCTION_FILE_PREFIX));
        // Unset: checked above and `&mut self` excludes other initializers.
        let _ = self.state.set(RegistryState::new(&config, transport));
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Configured stack depth, once initialized
    pub fn stack_depth(&self) -> Option<u32> {
        self.state.get().map(|s| s.stack_depth)
    }

    /// Whether stack-based caller inference is on (depth > 0)
    pub fn stack_collect(&self) -> bool {
        self.state.get().map_or(false, |s| s.stack_collect)
    }

    /// Number of functions registered so far
    pub fn len(&self) -> usize {
        self.state
            .get()
            .map_or(0, |s| s.functions.values().map(|m| m.len()).sum())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of the function created from `literal`, registering it on first
    /// sight
    ///
    /// Returns [`FunctionId::NONE`] for scripts without a name, filtered
    /// paths, the top-level script body, and once ids are exhausted.
    pub fn register_or_lookup<S, L>(
        &mut self,
        script: &S,
        literal: &L,
        is_constructor: bool,
    ) -> FunctionId
    where
        S: Script + ?Sized,
        L: FunctionLiteral + ?Sized,
    {
        let Some(path) = script.name() else {
            return FunctionId::NONE;
        };

        self.initialize();
        let Some(state) = self.state.get_mut() else {
            return FunctionId::NONE;
        };

        if !state.filter.should_trace(&path) {
            return FunctionId::NONE;
        }

        let file_index = literal.literal_id();
        if file_index == TOP_LEVEL_LITERAL {
            return FunctionId::NONE;
        }

        if let Some(id) = state.lookup(&path, file_index) {
            return id;
        }

        let Some(id) = state.allocate() else {
            tracing::warn!(path = %path, file_index, "function id space exhausted");
            return FunctionId::NONE;
        };
        let path = path.into_owned();
        state
            .functions
            .entry(path.clone())
            .or_default()
            .insert(file_index, id);

        let pos = resolve_position(script, literal);
        let def = FunctionDef {
            id,
            file_index,
            position_start: pos.start,
            position_end: pos.end,
            line: pos.line,
            column: pos.column,
            name: literal.debug_name().into_owned(),
            is_constructor,
            path,
            timestamp_ms: now_ms(),
        };
        tracing::trace!(id = %id, name = %def.name, path = %def.path, "registered function");
        state.serializer.serialize_function_def(&def);
        id
    }

    /// Id of an already registered function, without side effects
    ///
    /// Never initializes and never allocates. Returns [`FunctionId::NONE`]
    /// before initialization, when stack inference is off, and for anything
    /// [`register_or_lookup`](Self::register_or_lookup) would not trace or
    /// has not registered.
    pub fn lookup_only<S, L>(&self, script: &S, literal: &L) -> FunctionId
    where
        S: Script + ?Sized,
        L: FunctionLiteral + ?Sized,
    {
        let Some(state) = self.state.get() else {
            return FunctionId::NONE;
        };
        if !state.stack_collect {
            return FunctionId::NONE;
        }
        let Some(path) = script.name() else {
            return FunctionId::NONE;
        };
        if !state.filter.should_trace(&path) {
            return FunctionId::NONE;
        }
        let file_index = literal.literal_id();
        if file_index == TOP_LEVEL_LITERAL {
            return FunctionId::NONE;
        }
        state.lookup(&path, file_index).unwrap_or(FunctionId::NONE)
    }

    /// Push buffered definitions to the transport
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
}

/// Best-effort position: function token, then literal position, then start
///
/// Line and column stay 0 when the script cannot resolve the offset.
fn resolve_position<S, L>(script: &S, literal: &L) -> FunctionPosition
where
    S: Script + ?Sized,
    L: FunctionLiteral + ?Sized,
{
    let start = literal
        .function_token_position()
        .or_else(|| literal.position())
        .or_else(|| literal.start_position())
        .unwrap_or(NO_SOURCE_POSITION);

    let (line, column) = if start == NO_SOURCE_POSITION {
        (0, 0)
    } else {
        script
            .position_info(start)
            .map_or((0, 0), |lc| (lc.line + 1, lc.column + 1))
    };

    FunctionPosition {
        start,
        end: literal.end_position(),
        line,
        column,
    }
}
