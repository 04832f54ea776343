//! Trace record types: function definitions and call edges
//!
//! A trace is made of two record shapes. A [`FunctionDef`] announces a
//! traceable function the first time the engine materializes it, and a
//! [`FunctionCall`] links a caller to a callee (or marks an entry/exit when
//! stack inference is off).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source position used when the engine cannot place a function
pub const NO_SOURCE_POSITION: i32 = -1;

/// Dense identifier of a traced function
///
/// `FunctionId::NONE` means "not traced" when returned by the registry, and
/// "no caller" / "exit marker" inside a [`FunctionCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);

impl FunctionId {
    /// Sentinel for "no function"; serialized as `-1`
    pub const NONE: FunctionId = FunctionId(u32::MAX);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    pub const fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Value written on the wire (`-1` for NONE)
    pub const fn wire_value(self) -> i64 {
        if self.is_none() {
            -1
        } else {
            self.0 as i64
        }
    }

    /// Inverse of [`FunctionId::wire_value`]
    ///
    /// Any negative value is NONE; values that do not fit a u32 are rejected.
    pub fn from_wire(value: i64) -> Option<Self> {
        if value < 0 {
            Some(Self::NONE)
        } else {
            u32::try_from(value).ok().map(Self)
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_value())
    }
}

/// A traceable function, emitted once per (file index, path) key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub id: FunctionId,
    /// Engine-local id of the literal within its script
    pub file_index: i32,
    pub position_start: i32,
    pub position_end: i32,
    /// 1-based; 0 when unknown
    pub line: i32,
    /// 1-based; 0 when unknown
    pub column: i32,
    /// Best-effort debug name, may be empty
    pub name: String,
    pub is_constructor: bool,
    /// Script path or synthetic origin label (e.g. `node:timers`)
    pub path: String,
    pub timestamp_ms: i64,
}

/// A caller -> callee edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionCall {
    pub caller: FunctionId,
    pub callee: FunctionId,
    pub timestamp_ms: i64,
}

impl FunctionCall {
    pub fn new(caller: FunctionId, callee: FunctionId, timestamp_ms: i64) -> Self {
        Self {
            caller,
            callee,
            timestamp_ms,
        }
    }

    /// Entry record written when stack inference is off: `(NONE, callee)`
    pub fn entry(callee: FunctionId, timestamp_ms: i64) -> Self {
        Self::new(FunctionId::NONE, callee, timestamp_ms)
    }

    /// Exit marker written when stack inference is off: `(callee, NONE)`
    pub fn exit(callee: FunctionId, timestamp_ms: i64) -> Self {
        Self::new(callee, FunctionId::NONE, timestamp_ms)
    }

    pub fn is_entry(&self) -> bool {
        self.caller.is_none() && self.callee.is_some()
    }

    pub fn is_exit(&self) -> bool {
        self.caller.is_some() && self.callee.is_none()
    }

    /// Dedup key; timestamps do not take part in edge identity
    pub fn edge(&self) -> (FunctionId, FunctionId) {
        (self.caller, self.callee)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
///
/// A clock set before 1970 yields 0 rather than failing.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
