//! Record serializer: encodes trace records into a fixed buffer and flushes
//! full buffers to a [`Transport`]
//!
//! # Wire format
//!
//! One record per line, fields separated by tabs:
//!
//! ```text
//! definition: id  name[.constructor]  line  column  file_index  start  end  path  timestamp_ms
//! call:       caller  callee  timestamp_ms
//! ```
//!
//! NONE ids are written as `-1`. Readers tell the shapes apart by field count
//! (9 or 3).
//!
//! # Buffering
//!
//! A record is first encoded into a reusable line buffer, then copied into
//! the fixed [`RecordBuffer`]. If it does not fit, the pending bytes are
//! flushed first, so a record is never split across two deliveries. A record
//! larger than the whole buffer is delivered on its own right after that
//! flush.
//!
//! Delivery failures are logged, counted and dropped: nothing here ever
//! returns an error to the tracing call site.

use crate::record_buffer::{push_int, push_text, RecordBuffer};
use crate::records::{FunctionCall, FunctionDef};
use crate::transport::Transport;

const CONSTRUCTOR_SUFFIX: &str = ".constructor";

/// Initial size of the per-record scratch line
const LINE_SCRATCH: usize = 256;

/// Counters describing serializer activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializerStats {
    /// Records encoded
    pub records: u64,
    /// Deliveries attempted (successful or not)
    pub flushes: u64,
    /// Bytes handed to the transport successfully
    pub bytes_flushed: u64,
    /// Deliveries that failed
    pub failed_flushes: u64,
    /// Bytes lost to failed deliveries
    pub dropped_bytes: u64,
}

impl SerializerStats {
    /// Fraction of delivered bytes that were lost (0.0 to 1.0)
    pub fn drop_rate(&self) -> f64 {
        let total = self.bytes_flushed + self.dropped_bytes;
        if total == 0 {
            0.0
        } else {
            self.dropped_bytes as f64 / total as f64
        }
    }
}

/// Encode a definition record, including its trailing newline
pub fn encode_function_def(def: &FunctionDef, out: &mut Vec<u8>) {
    push_int(out, def.id.wire_value());
    out.push(b'\t');
    push_text(out, &def.name);
    if def.is_constructor {
        out.extend_from_slice(CONSTRUCTOR_SUFFIX.as_bytes());
    }
    out.push(b'\t');
    push_int(out, i64::from(def.line));
    out.push(b'\t');
    push_int(out, i64::from(def.column));
    out.push(b'\t');
    push_int(out, i64::from(def.file_index));
    out.push(b'\t');
    push_int(out, i64::from(def.position_start));
    out.push(b'\t');
    push_int(out, i64::from(def.position_end));
    out.push(b'\t');
    push_text(out, &def.path);
    out.push(b'\t');
    push_int(out, def.timestamp_ms);
    out.push(b'\n');
}

/// Encode a call record, including its trailing newline
pub fn encode_function_call(call: &FunctionCall, out: &mut Vec<u8>) {
    push_int(out, call.caller.wire_value());
    out.push(b'\t');
    push_int(out, call.callee.wire_value());
    out.push(b'\t');
    push_int(out, call.timestamp_ms);
    out.push(b'\n');
}

/// Buffered record writer owning its transport
#[derive(Debug)]
pub struct Serializer {
    buffer: RecordBuffer,
    line: Vec<u8>,
    transport: Transport,
    stats: SerializerStats,
}

impl Serializer {
    /// Create a serializer with a buffer of `capacity` bytes
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(transport: Transport, capacity: usize) -> Self {
        Self {
            buffer: RecordBuffer::new(capacity),
            line: Vec::with_capacity(LINE_SCRATCH),
            transport,
            stats: SerializerStats::default(),
        }
    }

    pub fn serialize_function_def(&mut self, def: &FunctionDef) {
        let mut line = std::mem::take(&mut self.line);
        encode_function_def(def, &mut line);
        self.append_line(line);
    }

    pub fn serialize_function_call(&mut self, call: &FunctionCall) {
        let mut line = std::mem::take(&mut self.line);
        encode_function_call(call, &mut line);
        self.append_line(line);
    }

    fn append_line(&mut self, mut line: Vec<u8>) {
        if !self.buffer.fits(line.len()) {
            self.flush();
        }
        if !self.buffer.try_push(&line) {
            // Longer than the whole buffer: write through.
            deliver(&mut self.transport, &mut self.stats, &line);
        }
        self.stats.records += 1;
        line.clear();
        self.line = line;
    }

    /// Deliver buffered bytes and reset the buffer; no-op when empty
    ///
    /// The buffer is reset even if delivery fails.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        deliver(&mut self.transport, &mut self.stats, self.buffer.as_slice());
        self.buffer.clear();
    }

    pub fn stats(&self) -> SerializerStats {
        self.stats
    }

    /// Bytes waiting for the next flush
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

fn deliver(transport: &mut Transport, stats: &mut SerializerStats, payload: &[u8]) {
    stats.flushes += 1;
    match transport.deliver(payload) {
        Ok(()) => {
            stats.bytes_flushed += payload.len() as u64;
            tracing::debug!(bytes = payload.len(), transport = transport.kind(), "flushed trace batch");
        }
        Err(e) => {
            stats.failed_flushes += 1;
            stats.dropped_bytes += payload.len() as u64;
            eprintln!("[cgtrace: {} - dropped {} bytes]", e, payload.len());
        }
    }
}

impl Drop for Serializer {
    fn drop(&mut self) {
        self.flush();
        self.transport.close();
    }
}
