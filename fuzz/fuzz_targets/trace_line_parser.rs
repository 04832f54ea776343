#![no_main]

use cgtrace::serializer::{encode_function_call, encode_function_def};
use cgtrace::trace_reader::{parse_line, TraceRecord};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // Never panics; anything accepted must survive re-encoding.
    if let Ok(Some(record)) = parse_line(input) {
        let mut line = Vec::new();
        match &record {
            TraceRecord::Definition(def) => encode_function_def(def, &mut line),
            TraceRecord::Call(call) => encode_function_call(call, &mut line),
        }
        if let Ok(text) = std::str::from_utf8(&line) {
            let _ = parse_line(text);
        }
    }
});
