use anyhow::Result;
use cgtrace::cli::{Cli, Command};
use cgtrace::merge;
use cgtrace::summary::CallGraphSummary;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    match args.command {
        Command::Merge { dir, output } => {
            let written = merge::run(&dir, output.as_deref())?;
            println!("Call graph written to {}", written.display());
        }
        Command::Summary { dir } => {
            let graph = merge::merge_directory(&dir)?;
            let summary = CallGraphSummary::from_graph(&graph);
            summary.print(&mut std::io::stdout().lock())?;
        }
    }

    Ok(())
}
