//! Orgmap CLI - planning-increment org charts from Grist tables.

use clap::Parser;
use orgmap::cli::{Cli, Commands, ConfigCommands};
use orgmap::commands::{self, Output, Workspace};
use orgmap::source::SourceRequest;
use std::env;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "ORGMAP_LOG";

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    init_logging(cli.verbose);

    let dir = resolve_dir(cli.dir, human);
    let ws = Workspace::new(dir, cli.mapping);

    if let Err(e) = run_command(cli.command, &ws, human) {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Logs go to stderr. `ORGMAP_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = env::var(LOG_ENV)
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Working directory: -C/--dir (or ORGMAP_DIR), else the current directory.
fn resolve_dir(explicit: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit {
        Some(path) => {
            if !path.is_dir() {
                if human {
                    eprintln!("Error: Specified directory does not exist: {}", path.display());
                } else {
                    eprintln!(
                        "{}",
                        serde_json::json!({
                            "error": format!("Specified directory does not exist: {}", path.display())
                        })
                    );
                }
                process::exit(1);
            }
            path
        }
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn run_command(command: Commands, ws: &Workspace, human: bool) -> Result<(), orgmap::Error> {
    match command {
        Commands::FullRun {
            period,
            source,
            llm,
            out,
        } => {
            let request = SourceRequest::from(&source);
            let result = commands::full_run(ws, &period, &request, llm, out.as_deref())?;
            output(&result, human);
        }
        Commands::Diagram {
            period,
            source,
            llm,
            out,
        } => {
            let request = SourceRequest::from(&source);
            let result = commands::diagram(ws, &period, &request, llm, out.as_deref())?;
            output(&result, human);
        }
        Commands::Excel {
            period,
            source,
            out,
        } => {
            let request = SourceRequest::from(&source);
            let result = commands::excel(ws, &period, &request, out.as_deref())?;
            output(&result, human);
        }
        Commands::Analyze { source, out } => {
            let result = commands::analyze(ws, &SourceRequest::from(&source), out.as_deref())?;
            output(&result, human);
        }
        Commands::Model { period, source } => {
            let result = commands::model(ws, &period, &SourceRequest::from(&source))?;
            output(&result, human);
        }
        Commands::Layout { period, source } => {
            let result = commands::layout(ws, &period, &SourceRequest::from(&source))?;
            output(&result, human);
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let result = commands::config_show(ws)?;
                output(&result, human);
            }
            ConfigCommands::Check => {
                let result = commands::config_check(ws)?;
                output(&result, human);
            }
        },
    }
    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
