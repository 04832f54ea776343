// Offline merge of per-process traces into one call graph
//
// Each traced process leaves a `func_<pid>.tsv` / `cg_<pid>.tsv` pair. Ids are
// local to a process, so functions are matched across processes by their
// source identity (file index, span, path) and renumbered in first-seen order.
// The merged graph is written as JSON keyed by global id, with every function
// named by a stable URI.

mod package;
mod replay;

pub use package::{
    display_name, function_uri, PackageInfo, PackageLocation, PackageResolver,
    UNKNOWN_PACKAGE_NAME, UNKNOWN_PACKAGE_VERSION,
};
pub use replay::{CallReplay, EdgeMap};

use crate::config::{CALL_GRAPH_FILE_PREFIX, FUNCTION_FILE_PREFIX};
use crate::records::{FunctionCall, FunctionDef, FunctionId};
use crate::trace_reader::{read_trace_file, TraceRecord};
use anyhow::{Context, Result};
use fnv::FnvHashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Default name of the merged graph inside the trace directory
pub const OUTPUT_FILE_NAME: &str = "cg.json";

const TRACE_EXTENSION: &str = ".tsv";
const FILE_SCHEME: &str = "file://";

/// Trace file pair of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFiles {
    pub process: String,
    pub definitions: PathBuf,
    pub calls: PathBuf,
}

/// Find every `func_<pid>.tsv` in `dir`, sorted by process id
pub fn discover(dir: &Path) -> Result<Vec<ProcessFiles>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read trace directory {}", dir.display()))?;
    let mut processes = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let file_name = entry.file_name();
        let Some(process) = file_name
            .to_str()
            .and_then(|name| name.strip_prefix(FUNCTION_FILE_PREFIX))
            .and_then(|rest| rest.strip_suffix(TRACE_EXTENSION))
        else {
            continue;
        };
        processes.push(ProcessFiles {
            process: process.to_string(),
            definitions: entry.path(),
            calls: dir.join(format!(
                "{}{}{}",
                CALL_GRAPH_FILE_PREFIX, process, TRACE_EXTENSION
            )),
        });
    }
    processes.sort_by(|a, b| {
        let key = |p: &ProcessFiles| (p.process.parse::<u64>().ok(), p.process.clone());
        key(a).cmp(&key(b))
    });
    Ok(processes)
}

/// A function of the merged graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFunction {
    pub id: u32,
    pub name: String,
    pub is_constructor: bool,
    pub file_index: i32,
    pub position_start: i32,
    pub position_end: i32,
    pub path: String,
}

impl MergedFunction {
    fn from_def(id: u32, def: &FunctionDef, path: String) -> Self {
        Self {
            id,
            name: def.name.clone(),
            is_constructor: def.is_constructor,
            file_index: def.file_index,
            position_start: def.position_start,
            position_end: def.position_end,
            path,
        }
    }

    pub fn display_name(&self) -> String {
        display_name(&self.name, self.position_start, self.position_end)
    }
}

/// Cross-process call graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    pub functions: Vec<MergedFunction>,
    pub edges: EdgeMap,
}

impl CallGraph {
    pub fn function(&self, id: u32) -> Option<&MergedFunction> {
        self.functions.get(id as usize)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|callees| callees.len()).sum()
    }
}

/// Accumulates processes into one [`CallGraph`]
#[derive(Debug, Default)]
pub struct Merger {
    keys: HashMap<String, u32>,
    graph: CallGraph,
    skipped_records: usize,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one process; returns its local → global id map
    pub fn add_process(
        &mut self,
        definitions: &[FunctionDef],
        calls: &[FunctionCall],
    ) -> FnvHashMap<FunctionId, u32> {
        let mut local_to_global = FnvHashMap::default();
        for def in definitions {
            let path = strip_file_scheme(&def.path);
            let key = identity_key(def, path);
            let next = self.graph.functions.len() as u32;
            let global = *self.keys.entry(key).or_insert(next);
            if global == next {
                self.graph
                    .functions
                    .push(MergedFunction::from_def(global, def, path.to_string()));
            }
            local_to_global.insert(def.id, global);
        }

        let mut replay = CallReplay::new(&local_to_global);
        for call in calls {
            replay.apply(call, &mut self.graph.edges);
        }
        self.skipped_records += replay.skipped();
        local_to_global
    }

    /// Read one process's files and add them
    pub fn add_files(&mut self, files: &ProcessFiles) -> Result<()> {
        let definitions: Vec<FunctionDef> = read_trace_file(&files.definitions)?
            .into_iter()
            .filter_map(|record| match record {
                TraceRecord::Definition(def) => Some(def),
                TraceRecord::Call(_) => None,
            })
            .collect();

        let calls: Vec<FunctionCall> = if files.calls.exists() {
            read_trace_file(&files.calls)?
                .into_iter()
                .filter_map(|record| match record {
                    TraceRecord::Call(call) => Some(call),
                    TraceRecord::Definition(_) => None,
                })
                .collect()
        } else {
            tracing::warn!(
                process = %files.process,
                "no call graph file at {}",
                files.calls.display()
            );
            Vec::new()
        };

        tracing::debug!(
            process = %files.process,
            definitions = definitions.len(),
            calls = calls.len(),
            "merging process"
        );
        self.add_process(&definitions, &calls);
        Ok(())
    }

    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }

    pub fn finish(self) -> CallGraph {
        self.graph
    }
}

/// Merge every process trace found in `dir`
pub fn merge_directory(dir: &Path) -> Result<CallGraph> {
    let processes = discover(dir)?;
    let mut merger = Merger::new();
    for files in &processes {
        merger.add_files(files)?;
    }
    if merger.skipped_records() > 0 {
        tracing::warn!(
            skipped = merger.skipped_records(),
            "call records referenced unknown functions"
        );
    }
    Ok(merger.finish())
}

fn strip_file_scheme(path: &str) -> &str {
    let path = path.trim();
    path.strip_prefix(FILE_SCHEME).unwrap_or(path)
}

fn identity_key(def: &FunctionDef, path: &str) -> String {
    format!(
        "{}_{}_{}_{}",
        def.file_index, def.position_start, def.position_end, path
    )
}

/// Callees of one caller in the JSON output
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CallTargets {
    pub nodes: Vec<u32>,
}

/// JSON form of a merged call graph
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallGraphDocument {
    pub package_name: String,
    pub create_time: String,
    pub function_map: BTreeMap<u32, String>,
    pub callgraph: BTreeMap<u32, CallTargets>,
}

impl CallGraphDocument {
    /// Name every function and attach the package of `root`
    pub fn build(graph: &CallGraph, root: &Path) -> Self {
        let mut resolver = PackageResolver::new();
        let package = resolver
            .manifest(root)
            .unwrap_or_else(PackageInfo::unknown);

        let function_map = graph
            .functions
            .iter()
            .map(|f| {
                let uri = function_uri(
                    &mut resolver,
                    &f.name,
                    f.position_start,
                    f.position_end,
                    &f.path,
                );
                (f.id, uri)
            })
            .collect();

        let callgraph = graph
            .edges
            .iter()
            .map(|(&caller, callees)| {
                (
                    caller,
                    CallTargets {
                        nodes: callees.iter().copied().collect(),
                    },
                )
            })
            .collect();

        Self {
            package_name: package.qualified(),
            create_time: String::new(),
            function_map,
            callgraph,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize call graph")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write call graph to {}", path.display()))
    }
}

/// Merge `dir` and write the graph to `output` (default `dir/cg.json`)
pub fn run(dir: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let graph = merge_directory(dir)?;
    let document = CallGraphDocument::build(&graph, dir);
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.join(OUTPUT_FILE_NAME));
    document.write(&output)?;
    tracing::debug!(
        functions = graph.functions.len(),
        edges = graph.edge_count(),
        output = %output.display(),
        "call graph written"
    );
    Ok(output)
}
