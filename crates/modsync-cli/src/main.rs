//! ModSync CLI
//!
//! Keeps a game install's mod folders in step with a ModSync server.

mod cli;
mod commands;
mod context;
mod error;
mod remote;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::SyncOptions;
use context::Context;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command.clone() else {
        println!("{} ModSync client", "modsync".green().bold());
        println!();
        println!("Run {} for available commands.", "modsync --help".cyan());
        return Ok(());
    };

    let cwd = std::env::current_dir()?;
    let ctx = Context::resolve(&cli, &cwd)?;

    match command {
        Commands::Sync {
            yes,
            dry_run,
            headless,
        } => commands::run_sync(
            ctx,
            SyncOptions {
                yes,
                dry_run,
                headless,
            },
        ),
        Commands::Status { json } => commands::run_status(&ctx, json),
        Commands::Rollback => commands::run_rollback(&ctx),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "modsync=debug" } else { "modsync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}
