// Fan-in / fan-out summary of a merged call graph

use crate::merge::{CallGraph, PackageResolver};
use std::io::Write;

/// Degree counts of one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDegree {
    pub id: u32,
    pub name: String,
    pub fan_in: usize,
    pub fan_out: usize,
}

/// Per-function fan-in and fan-out, sorted by fan-in (descending)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraphSummary {
    pub degrees: Vec<FunctionDegree>,
    pub edges: usize,
}

impl CallGraphSummary {
    pub fn from_graph(graph: &CallGraph) -> Self {
        let mut resolver = PackageResolver::new();
        let mut degrees: Vec<FunctionDegree> = graph
            .functions
            .iter()
            .map(|f| FunctionDegree {
                id: f.id,
                name: label(&mut resolver, f.display_name(), &f.path),
                fan_in: 0,
                fan_out: graph.edges.get(&f.id).map_or(0, |callees| callees.len()),
            })
            .collect();

        for callee in graph.edges.values().flatten() {
            if let Some(degree) = degrees.get_mut(*callee as usize) {
                degree.fan_in += 1;
            }
        }

        degrees.sort_by(|a, b| {
            b.fan_in
                .cmp(&a.fan_in)
                .then(b.fan_out.cmp(&a.fan_out))
                .then(a.id.cmp(&b.id))
        });

        Self {
            degrees,
            edges: graph.edge_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }

    /// Print the table
    pub fn print<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        if self.is_empty() {
            writeln!(out, "\nNo call graph data collected.")?;
            return Ok(());
        }

        writeln!(out, "\n╔════════════════════════════════════════════════════════════════════════════════╗")?;
        writeln!(out, "║  Call Graph Summary (sorted by fan-in)                                         ║")?;
        writeln!(out, "╚════════════════════════════════════════════════════════════════════════════════╝")?;
        writeln!(out)?;
        writeln!(out, "{:<8} {:<56} {:>10} {:>10}", "Id", "Function", "Fan-in", "Fan-out")?;
        writeln!(out, "{}", "─".repeat(87))?;

        for degree in &self.degrees {
            writeln!(
                out,
                "{:<8} {:<56} {:>10} {:>10}",
                degree.id,
                truncate(&degree.name, 56),
                degree.fan_in,
                degree.fan_out
            )?;
        }

        writeln!(out, "{}", "─".repeat(87))?;
        writeln!(
            out,
            "{} functions, {} edges",
            self.degrees.len(),
            self.edges
        )?;
        Ok(())
    }
}

/// `name (file)` with the package-relative file when one is known
fn label(resolver: &mut PackageResolver, name: String, path: &str) -> String {
    let name = if name.is_empty() { "<top-level>".to_string() } else { name };
    if path.starts_with("node:") {
        return format!("{} ({})", name, path);
    }
    let location = resolver.locate(path);
    format!("{} ({})", name, location.relative)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", kept)
}
