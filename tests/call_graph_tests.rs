//! Integration tests for call-graph reconstruction
//!
//! Drives a full `TracerContext` the way an engine would: functions are
//! registered first, then entries are reported with a top-down stack of
//! frame snapshots. Edges are checked on the captured call stream.

use cgtrace::config::TraceConfig;
use cgtrace::context::TracerContext;
use cgtrace::host::{FrameSnapshot, FunctionKey, LiteralInfo, SourceScript};
use cgtrace::records::{FunctionCall, FunctionId};
use cgtrace::trace_reader::{parse_line, TraceRecord};
use cgtrace::transport::{CaptureSink, Transport};

struct Harness {
    tracer: TracerContext,
    calls: CaptureSink,
    script: SourceScript,
    next_literal: i32,
}

impl Harness {
    fn new(depth: u32) -> Self {
        let calls = CaptureSink::new();
        let tracer = TracerContext::with_transports(
            TraceConfig::default().with_stack_depth(depth),
            Transport::Capture(CaptureSink::new()),
            Transport::Capture(calls.clone()),
        );
        Self {
            tracer,
            calls,
            script: SourceScript::new("/app/main.js", ""),
            next_literal: 1,
        }
    }

    fn define(&mut self, name: &str) -> FunctionId {
        let literal = LiteralInfo::new(self.next_literal, 0, 1).named(name);
        self.next_literal += 1;
        self.tracer
            .trace_function_creation(&self.script, &literal, false)
    }

    fn recorded(&mut self) -> Vec<FunctionCall> {
        self.tracer.flush();
        self.calls
            .lines()
            .iter()
            .filter_map(|line| match parse_line(line).ok().flatten() {
                Some(TraceRecord::Call(call)) => Some(call),
                _ => None,
            })
            .collect()
    }

    fn edges(&mut self) -> Vec<(FunctionId, FunctionId)> {
        self.recorded().iter().map(FunctionCall::edge).collect()
    }
}

fn frame(address: usize) -> FrameSnapshot {
    FrameSnapshot::new(FunctionKey::from_address(address))
}

const MAIN: usize = 0x1000;
const A: usize = 0x2000;
const B: usize = 0x3000;
const C: usize = 0x4000;
const DISPATCH: usize = 0x5000;
const REGISTER: usize = 0x6000;

#[test]
fn test_without_inference_every_call_is_recorded() {
    let mut h = Harness::new(1);
    let f = h.define("f");
    for _ in 0..3 {
        h.tracer.trace_enter(f, [frame(A)]);
    }
    let calls = h.recorded();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.is_entry() && c.callee == f));
}

#[test]
fn test_without_inference_exit_markers() {
    let mut h = Harness::new(0);
    let f = h.define("f");
    h.tracer.trace_enter(f, Vec::<FrameSnapshot>::new());
    h.tracer.trace_exit(f);
    h.tracer.trace_exit(FunctionId::NONE);

    let calls = h.recorded();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].edge(), (FunctionId::NONE, f));
    assert_eq!(calls[1].edge(), (f, FunctionId::NONE));
    assert!(calls[1].timestamp_ms >= calls[0].timestamp_ms);
}

#[test]
fn test_repeated_edge_is_recorded_once() {
    let mut h = Harness::new(10);
    let main = h.define("main");
    let a = h.define("a");
    let b = h.define("b");
    let c = h.define("c");

    h.tracer.trace_enter(main, [frame(MAIN)]);
    h.tracer.trace_enter(a, [frame(A), frame(MAIN)]);
    h.tracer.trace_enter(b, [frame(B), frame(A), frame(MAIN)]);
    h.tracer.trace_enter(b, [frame(B), frame(A), frame(MAIN)]);
    h.tracer.trace_enter(c, [frame(C), frame(A), frame(MAIN)]);

    assert_eq!(h.edges(), vec![(main, a), (a, b), (a, c)]);
    assert_eq!(h.tracer.call_graph().known_edge_count(), 3);
}

#[test]
fn test_untraced_frames_are_skipped() {
    let mut h = Harness::new(10);
    let main = h.define("main");
    let b = h.define("b");

    h.tracer.trace_enter(main, [frame(MAIN)]);
    // Two engine frames without ids sit between main and b.
    h.tracer
        .trace_enter(b, [frame(B), frame(0xdead), frame(0xbeef), frame(MAIN)]);
    assert_eq!(h.edges(), vec![(main, b)]);
}

#[test]
fn test_caller_found_beyond_configured_depth() {
    let mut h = Harness::new(2);
    let main = h.define("main");
    let b = h.define("b");
    let register = h.define("register");

    h.tracer.trace_enter(main, [frame(MAIN)]);
    // Three untraced engine frames separate b from main.
    h.tracer.trace_enter(
        b,
        [frame(B), frame(0xd1), frame(0xd2), frame(0xd3), frame(MAIN)],
    );
    assert_eq!(h.edges(), vec![(main, b)]);

    // Callback registration resolves through the same walk.
    h.tracer.trace_enter(
        register,
        [
            frame(REGISTER).with_callback(FunctionKey::from_address(0xc0)),
            frame(0xd1),
            frame(0xd2),
            frame(B),
        ],
    );
    assert_eq!(h.tracer.call_graph().registered_callback_count(), 1);
    assert_eq!(h.edges(), vec![(main, b), (b, register)]);
}

#[test]
fn test_callback_is_attributed_to_registrant() {
    let mut h = Harness::new(10);
    let main = h.define("main");
    let a = h.define("a");
    let register = h.define("register");
    let b = h.define("b");

    h.tracer.trace_enter(main, [frame(MAIN)]);
    h.tracer.trace_enter(a, [frame(A), frame(MAIN)]);
    // a hands b to register without calling it.
    h.tracer.trace_enter(
        register,
        [
            frame(REGISTER).with_value().with_callback(FunctionKey::from_address(B)),
            frame(A),
            frame(MAIN),
        ],
    );
    assert_eq!(h.tracer.call_graph().registered_callback_count(), 1);

    // Later an untraced dispatcher runs b from an otherwise empty stack.
    h.tracer.trace_enter(b, [frame(B), frame(DISPATCH)]);

    let edges = h.edges();
    assert_eq!(edges, vec![(main, a), (a, register), (a, b)]);
}

#[test]
fn test_callback_edge_is_deduplicated() {
    let mut h = Harness::new(10);
    let a = h.define("a");
    let register = h.define("register");
    let b = h.define("b");

    h.tracer.trace_enter(a, [frame(A)]);
    h.tracer.trace_enter(
        register,
        [
            frame(REGISTER).with_callback(FunctionKey::from_address(B)),
            frame(A),
        ],
    );
    for _ in 0..3 {
        h.tracer.trace_enter(b, [frame(B), frame(DISPATCH)]);
    }
    assert_eq!(h.edges(), vec![(a, register), (a, b)]);
}

#[test]
fn test_forget_function_drops_correlations() {
    let mut h = Harness::new(10);
    let a = h.define("a");
    let b = h.define("b");

    h.tracer.trace_enter(a, [frame(A)]);
    assert!(h.tracer.forget_function(FunctionKey::from_address(A)));
    assert!(!h.tracer.forget_function(FunctionKey::from_address(A)));

    // The address now belongs to an unrelated function.
    h.tracer.trace_enter(b, [frame(B), frame(A)]);
    assert!(h.edges().is_empty());
}

#[test]
fn test_reused_address_with_new_generation_is_unknown() {
    let mut h = Harness::new(10);
    let a = h.define("a");
    let b = h.define("b");

    h.tracer
        .trace_enter(a, [FrameSnapshot::new(FunctionKey::new(A, 1))]);
    h.tracer.trace_enter(
        b,
        [frame(B), FrameSnapshot::new(FunctionKey::new(A, 2))],
    );
    assert!(h.edges().is_empty());
}

#[test]
fn test_calls_before_any_registration_are_ignored() {
    let calls = CaptureSink::new();
    let mut tracer = TracerContext::with_transports(
        TraceConfig::default(),
        Transport::Capture(CaptureSink::new()),
        Transport::Capture(calls.clone()),
    );
    tracer.trace_enter(FunctionId::new(0), [frame(A)]);
    tracer.trace_exit(FunctionId::new(0));
    tracer.flush();
    assert!(calls.lines().is_empty());
    assert!(!tracer.call_graph().is_initialized());
}
