//! Drover - declarative cluster lifecycle manager
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use drover::cli::{Cli, Commands};
use drover::error::{DroverError, DroverResult};
use drover::updater::SyncDirection;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        // A declined confirmation is an orderly stop, not a fault
        Err(DroverError::Aborted) => {
            eprintln!("{}", style("Aborted.").dim());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DroverResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("drover=warn"),
        1 => EnvFilter::new("drover=info"),
        _ => EnvFilter::new("drover=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Up(args) => drover::cli::commands::up(args).await,
        Commands::Down(args) => drover::cli::commands::down(args).await,
        Commands::Exec(args) => drover::cli::commands::exec(args).await,
        Commands::Attach(args) => drover::cli::commands::attach(args).await,
        Commands::RsyncUp(args) => drover::cli::commands::rsync(args, SyncDirection::Up).await,
        Commands::RsyncDown(args) => drover::cli::commands::rsync(args, SyncDirection::Down).await,
        Commands::HeadIp(args) => drover::cli::commands::head_ip(args).await,
        Commands::WorkerIps(args) => drover::cli::commands::worker_ips(args).await,
        Commands::KillNode(args) => drover::cli::commands::kill_node(args).await,
        Commands::Monitor(args) => drover::cli::commands::monitor(args).await,
        Commands::Status => drover::cli::commands::status().await,
        Commands::RequestResources(args) => {
            drover::cli::commands::request_resources(args).await
        }
    }
}
