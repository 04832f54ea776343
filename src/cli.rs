//! CLI argument parsing for cgtrace

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cgtrace")]
#[command(version)]
#[command(about = "Merge and inspect dynamic call-graph traces", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge per-process func_<pid>.tsv / cg_<pid>.tsv files into one JSON call graph
    Merge {
        /// Directory holding the trace files
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output file (default: <DIR>/cg.json)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print fan-in / fan-out per function across the traces in a directory
    Summary {
        /// Directory holding the trace files
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_merge() {
        let cli = Cli::parse_from(["cgtrace", "merge", "traces"]);
        assert!(!cli.debug);
        match cli.command {
            Command::Merge { dir, output } => {
                assert_eq!(dir, PathBuf::from("traces"));
                assert!(output.is_none());
            }
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_merge_output() {
        let cli = Cli::parse_from(["cgtrace", "merge", "traces", "-o", "out.json"]);
        let Command::Merge { output, .. } = cli.command else {
            panic!("expected merge");
        };
        assert_eq!(output, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_cli_debug_is_global() {
        let cli = Cli::parse_from(["cgtrace", "summary", "traces", "--debug"]);
        assert!(cli.debug);
        assert!(matches!(cli.command, Command::Summary { .. }));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["cgtrace"]).is_err());
    }
}
