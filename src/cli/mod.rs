//! CLI argument definitions for Orgmap.

use crate::source::SourceRequest;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("ORGMAP_GIT_COMMIT"),
    ", built ",
    env!("ORGMAP_BUILD_TIMESTAMP"),
    ")"
);

/// Orgmap - planning-increment org charts from Grist tables.
///
/// Start with `orgmap full-run --period PI-10 --demo` to see every artifact.
#[derive(Parser, Debug)]
#[command(name = "orgmap")]
#[command(long_version = LONG_VERSION)]
#[command(author, version, about = "Builds a PI org chart, fragmentation report and diagram from Grist tables", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Increase log verbosity on stderr (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Run as if orgmap was started in <path> instead of the current directory.
    /// Can also be set via ORGMAP_DIR environment variable.
    #[arg(short = 'C', long = "dir", global = true, env = "ORGMAP_DIR")]
    pub dir: Option<PathBuf>,

    /// Mapping file applied on top of the embedded, system and project mappings
    #[arg(long = "mapping", global = true, value_name = "FILE")]
    pub mapping: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the five tables come from.
///
/// Precedence: --demo, then --source, then --api, then the newest
/// `data/*.grist` in the working directory.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Read a Grist document file (.grist)
    #[arg(long = "source", value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// Fetch tables from the Grist REST API (GRIST_API_KEY, GRIST_DOC_ID)
    #[arg(long)]
    pub api: bool,

    /// Use the built-in demo data set
    #[arg(long)]
    pub demo: bool,
}

impl From<&SourceArgs> for SourceRequest {
    fn from(args: &SourceArgs) -> Self {
        SourceRequest {
            demo: args.demo,
            file: args.source.clone(),
            api: args.api,
        }
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build everything: diagram, fragmentation reports, README, model JSON and epic workbook
    FullRun {
        /// Planning increment (e.g. "PI-10", "10", "pi 10")
        #[arg(short, long)]
        period: String,

        #[command(flatten)]
        source: SourceArgs,

        /// Summarize team narratives through the LLM endpoint (LLM_API_KEY)
        #[arg(long)]
        llm: bool,

        /// Output directory (default: <dir>/output)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Write only the .drawio diagram
    Diagram {
        /// Planning increment (e.g. "PI-10")
        #[arg(short, long)]
        period: String,

        #[command(flatten)]
        source: SourceArgs,

        /// Summarize team narratives through the LLM endpoint (LLM_API_KEY)
        #[arg(long)]
        llm: bool,

        /// Output directory (default: <dir>/output)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Write only the epic summary workbook (.xlsx)
    Excel {
        /// Planning increment (e.g. "PI-10")
        #[arg(short, long)]
        period: String,

        #[command(flatten)]
        source: SourceArgs,

        /// Output directory (default: <dir>/output)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Write the fragmentation CSV and synthesis only
    Analyze {
        #[command(flatten)]
        source: SourceArgs,

        /// Output directory (default: <dir>/output)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Print the built model for a period
    Model {
        /// Planning increment (e.g. "PI-10")
        #[arg(short, long)]
        period: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print the computed page layout for a period
    Layout {
        /// Planning increment (e.g. "PI-10")
        #[arg(short, long)]
        period: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Mapping and environment configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved column mapping and where each value came from
    Show,

    /// Report which environment settings are missing
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // This will panic if the CLI is misconfigured
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_full_run() {
        let cli = Cli::try_parse_from([
            "orgmap", "-H", "-vv", "full-run", "--period", "10", "--demo", "--out", "/tmp/o",
        ])
        .unwrap();
        assert!(cli.human_readable);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::FullRun {
                period,
                source,
                llm,
                out,
            } => {
                assert_eq!(period, "10");
                assert!(source.demo);
                assert!(!llm);
                assert_eq!(out, Some(PathBuf::from("/tmp/o")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_excel() {
        let cli = Cli::try_parse_from(["orgmap", "excel", "-p", "PI-7", "--source", "d.grist"]).unwrap();
        match cli.command {
            Commands::Excel { period, source, out } => {
                assert_eq!(period, "PI-7");
                assert_eq!(source.source, Some(PathBuf::from("d.grist")));
                assert!(out.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Cli::try_parse_from(["orgmap", "excel", "-p", "7", "--demo", "--llm"]).is_err());
    }

    #[test]
    fn test_period_required() {
        assert!(Cli::try_parse_from(["orgmap", "model", "--demo"]).is_err());
        assert!(Cli::try_parse_from(["orgmap", "analyze", "--demo"]).is_ok());
    }
}
