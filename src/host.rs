//! Interface to the host execution engine
//!
//! The tracer never touches engine objects directly. It sees scripts,
//! function literals and stack frames through the traits below, which an
//! embedding implements over its own representations.
//!
//! Plain-data implementations ([`SourceScript`], [`LiteralInfo`],
//! [`FrameSnapshot`]) are provided for embedders that capture engine state
//! up front, and for tests.

use std::borrow::Cow;

/// 0-based line and column of a source offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineColumn {
    pub line: i32,
    pub column: i32,
}

/// A script (compilation unit) owning function literals
pub trait Script {
    /// Display name of the script
    ///
    /// `None` while the engine has not materialized the name as a string;
    /// such scripts are never traced.
    fn name(&self) -> Option<Cow<'_, str>>;

    /// Resolve a source offset to a 0-based line/column
    ///
    /// `None` when the owning script source is unavailable.
    fn position_info(&self, position: i32) -> Option<LineColumn>;
}

/// A function literal about to be materialized
pub trait FunctionLiteral {
    /// Id of the literal within its script; 0 is the top-level script body
    fn literal_id(&self) -> i32;

    /// Offset of the `function` token, if any
    fn function_token_position(&self) -> Option<i32>;

    /// Offset the engine reports as the literal's position
    fn position(&self) -> Option<i32>;

    /// Offset where the literal's source starts
    fn start_position(&self) -> Option<i32>;

    fn end_position(&self) -> i32;

    /// Best-effort debug name, possibly empty
    fn debug_name(&self) -> Cow<'_, str>;
}

/// Stable identity of the function object running in a frame
///
/// An address alone may be reused once the engine collects a function, so
/// the host pairs it with an allocation generation. Hosts that can tell when
/// a function dies should also call
/// [`TracerContext::forget_function`](crate::context::TracerContext::forget_function).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionKey {
    address: usize,
    generation: u32,
}

impl FunctionKey {
    pub const fn new(address: usize, generation: u32) -> Self {
        Self {
            address,
            generation,
        }
    }

    /// Key for hosts without generation tracking
    pub const fn from_address(address: usize) -> Self {
        Self::new(address, 0)
    }

    pub const fn address(self) -> usize {
        self.address
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// An actual argument of a frame, as far as the tracer cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameArgument {
    /// A callable value and the identity of its underlying function
    Callable(FunctionKey),
    /// Anything else
    Value,
}

/// One frame of the live call stack
pub trait StackFrame {
    fn function_key(&self) -> FunctionKey;

    fn argument_count(&self) -> usize;

    fn argument(&self, index: usize) -> FrameArgument;
}

impl<T: StackFrame + ?Sized> StackFrame for &T {
    fn function_key(&self) -> FunctionKey {
        (**self).function_key()
    }

    fn argument_count(&self) -> usize {
        (**self).argument_count()
    }

    fn argument(&self, index: usize) -> FrameArgument {
        (**self).argument(index)
    }
}

/// Script with an optional line table built from its source
#[derive(Debug, Clone)]
pub struct SourceScript {
    name: Option<String>,
    /// Byte offset of the start of each line
    line_starts: Option<Vec<i32>>,
}

impl SourceScript {
    /// Named script whose offsets resolve against `source`
    pub fn new(name: impl Into<String>, source: &str) -> Self {
        Self {
            name: Some(name.into()),
            line_starts: Some(line_starts(source)),
        }
    }

    /// Named script whose source is unavailable
    pub fn without_source(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            line_starts: None,
        }
    }

    /// Script whose name is not (yet) a string
    pub fn unnamed(source: &str) -> Self {
        Self {
            name: None,
            line_starts: Some(line_starts(source)),
        }
    }
}

fn line_starts(source: &str) -> Vec<i32> {
    std::iter::once(0)
        .chain(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i32::try_from(i + 1).unwrap_or(i32::MAX)),
        )
        .collect()
}

impl Script for SourceScript {
    fn name(&self) -> Option<Cow<'_, str>> {
        self.name.as_deref().map(Cow::Borrowed)
    }

    fn position_info(&self, position: i32) -> Option<LineColumn> {
        let starts = self.line_starts.as_ref()?;
        if position < 0 {
            return None;
        }
        // Index of the last line starting at or before `position`.
        let line = starts.partition_point(|&start| start <= position) - 1;
        Some(LineColumn {
            line: line as i32,
            column: position - starts[line],
        })
    }
}

/// Literal metadata captured as plain data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralInfo {
    pub literal_id: i32,
    pub function_token_position: Option<i32>,
    pub position: Option<i32>,
    pub start_position: Option<i32>,
    pub end_position: i32,
    pub debug_name: String,
}

impl LiteralInfo {
    /// Literal spanning `start..end` with no token position and no name
    pub fn new(literal_id: i32, start: i32, end: i32) -> Self {
        Self {
            literal_id,
            function_token_position: None,
            position: None,
            start_position: Some(start),
            end_position: end,
            debug_name: String::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.debug_name = name.into();
        self
    }

    pub fn with_token_position(mut self, position: i32) -> Self {
        self.function_token_position = Some(position);
        self
    }

    pub fn with_position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }
}

impl FunctionLiteral for LiteralInfo {
    fn literal_id(&self) -> i32 {
        self.literal_id
    }

    fn function_token_position(&self) -> Option<i32> {
        self.function_token_position
    }

    fn position(&self) -> Option<i32> {
        self.position
    }

    fn start_position(&self) -> Option<i32> {
        self.start_position
    }

    fn end_position(&self) -> i32 {
        self.end_position
    }

    fn debug_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.debug_name)
    }
}

/// A captured stack frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub key: FunctionKey,
    pub arguments: Vec<FrameArgument>,
}

impl FrameSnapshot {
    /// Frame without arguments
    pub fn new(key: FunctionKey) -> Self {
        Self {
            key,
            arguments: Vec::new(),
        }
    }

    /// Append a callable argument
    pub fn with_callback(mut self, callback: FunctionKey) -> Self {
        self.arguments.push(FrameArgument::Callable(callback));
        self
    }

    /// Append a non-callable argument
    pub fn with_value(mut self) -> Self {
        self.arguments.push(FrameArgument::Value);
        self
    }
}

impl StackFrame for FrameSnapshot {
    fn function_key(&self) -> FunctionKey {
        self.key
    }

    fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    fn argument(&self, index: usize) -> FrameArgument {
        self.arguments
            .get(index)
            .copied()
            .unwrap_or(FrameArgument::Value)
    }
}
