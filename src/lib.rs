//! cgtrace - dynamic call-graph tracer for embedding in a script engine
//!
//! The engine reports function creation and call entry/exit through a
//! [`TracerContext`](context::TracerContext). Definitions and caller/callee
//! edges are written as tab-separated records to per-process files or POSTed
//! to an HTTP endpoint. The offline side reads those records back, merges the
//! traces of many processes and summarizes the resulting call graph.

pub mod call_graph;
pub mod cli;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod filter;
pub mod host;
pub mod http_transport;
pub mod merge;
pub mod record_buffer;
pub mod records;
pub mod registry;
pub mod serializer;
pub mod summary;
pub mod trace_reader;
pub mod transport;
