//! Reader for the tab-separated trace format
//!
//! Records carry no type tag: nine fields make a definition, three make a
//! call (or entry/exit marker). Blank lines are skipped.

use crate::records::{FunctionCall, FunctionDef, FunctionId};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

const DEFINITION_FIELDS: usize = 9;
const CALL_FIELDS: usize = 3;
const CONSTRUCTOR_SUFFIX: &str = ".constructor";

/// Errors found in a single trace line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected 9 or 3 fields, found {0}")]
    FieldCount(usize),

    #[error("Invalid integer in field {field}: {value:?}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("Function id out of range: {0}")]
    InvalidId(i64),
}

/// One parsed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Definition(FunctionDef),
    Call(FunctionCall),
}

/// Parse one line; `Ok(None)` for blank lines
pub fn parse_line(line: &str) -> Result<Option<TraceRecord>, ParseError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split('\t').collect();
    match fields.len() {
        DEFINITION_FIELDS => parse_definition(&fields).map(|d| Some(TraceRecord::Definition(d))),
        CALL_FIELDS => parse_call(&fields).map(|c| Some(TraceRecord::Call(c))),
        n => Err(ParseError::FieldCount(n)),
    }
}

fn parse_definition(fields: &[&str]) -> Result<FunctionDef, ParseError> {
    let id = parse_id("id", fields[0])?;
    if id.is_none() {
        return Err(ParseError::InvalidId(-1));
    }
    let (name, is_constructor) = match fields[1].strip_suffix(CONSTRUCTOR_SUFFIX) {
        Some(name) => (name, true),
        None => (fields[1], false),
    };
    Ok(FunctionDef {
        id,
        name: name.to_string(),
        is_constructor,
        line: parse_i32("line", fields[2])?,
        column: parse_i32("column", fields[3])?,
        file_index: parse_i32("file_index", fields[4])?,
        position_start: parse_i32("position_start", fields[5])?,
        position_end: parse_i32("position_end", fields[6])?,
        path: fields[7].to_string(),
        timestamp_ms: parse_i64("timestamp_ms", fields[8])?,
    })
}

fn parse_call(fields: &[&str]) -> Result<FunctionCall, ParseError> {
    Ok(FunctionCall {
        caller: parse_id("caller", fields[0])?,
        callee: parse_id("callee", fields[1])?,
        timestamp_ms: parse_i64("timestamp_ms", fields[2])?,
    })
}

fn parse_i64(field: &'static str, value: &str) -> Result<i64, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidInteger {
        field,
        value: value.to_string(),
    })
}

fn parse_i32(field: &'static str, value: &str) -> Result<i32, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidInteger {
        field,
        value: value.to_string(),
    })
}

fn parse_id(field: &'static str, value: &str) -> Result<FunctionId, ParseError> {
    let raw = parse_i64(field, value)?;
    FunctionId::from_wire(raw).ok_or(ParseError::InvalidId(raw))
}

/// Parse every line of `reader`, skipping malformed lines with a warning
pub fn parse_trace<R: BufRead>(reader: R) -> Result<Vec<TraceRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read trace line {}", index + 1))?;
        match parse_line(&line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => tracing::warn!(line = index + 1, "skipping malformed trace line: {}", e),
        }
    }
    Ok(records)
}

/// Read and parse a trace file
pub fn read_trace_file(path: impl AsRef<Path>) -> Result<Vec<TraceRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open trace file {}", path.display()))?;
    parse_trace(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse trace file {}", path.display()))
}
