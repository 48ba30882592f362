#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![allow(clippy::multiple_crate_versions)]

//! `btnd` — durable local mirror of the tracker metadata catalog.

use std::path::PathBuf;
use std::process::ExitCode;

use btnd_app::{RunOptions, WorkerSelection};
use clap::{Parser, Subcommand};
use tracing::error;

#[derive(Debug, Parser)]
#[command(
    name = "btnd",
    about = "Mirror the tracker metadata catalog into a local cache"
)]
struct Cli {
    /// Cache directory holding config.yaml and the databases
    /// (default: ~/.btn).
    #[arg(long = "btn_cache_path", value_name = "DIR", global = true)]
    btn_cache_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every worker until interrupted (the default).
    Run,
    /// Run only the full-catalog backfill workers.
    Backfill {
        /// Stop once the token budget is spent.
        #[arg(long)]
        once: bool,
    },
    /// Run only the head-of-catalog tip worker.
    Tip {
        /// Stop after one completed pass.
        #[arg(long)]
        once: bool,
    },
    /// Run only the file-layout worker.
    Files,
}

impl Cli {
    fn run_options(self) -> RunOptions {
        let (workers, once) = match self.command.unwrap_or(Command::Run) {
            Command::Run => (WorkerSelection::default(), false),
            Command::Backfill { once } => (
                WorkerSelection {
                    backfill: true,
                    tip: false,
                    files: false,
                },
                once,
            ),
            Command::Tip { once } => (
                WorkerSelection {
                    backfill: false,
                    tip: true,
                    files: false,
                },
                once,
            ),
            Command::Files => (
                WorkerSelection {
                    backfill: false,
                    tip: false,
                    files: true,
                },
                false,
            ),
        };
        RunOptions {
            cache_path: self.btn_cache_path,
            workers,
            once,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = btnd_telemetry::init_logging(&btnd_telemetry::LoggingConfig::default()) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }
    match btnd_app::run(cli.run_options()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal");
            ExitCode::FAILURE
        }
    }
}
