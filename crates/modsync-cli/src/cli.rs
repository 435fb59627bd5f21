//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ModSync - keep a game install's mods in step with a server
#[derive(Parser, Debug)]
#[command(name = "modsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Install root (defaults to the current directory)
    #[arg(long, global = true, env = "MODSYNC_ROOT")]
    pub root: Option<PathBuf>,

    /// Server URL, overriding Settings.json
    #[arg(long, global = true, env = "MODSYNC_SERVER")]
    pub server: Option<String>,

    /// Identity sent to the server, overriding Settings.json
    #[arg(long, global = true)]
    pub identity: Option<String>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Download changes from the server
    ///
    /// Examples:
    ///   modsync sync                 # Ask before applying optional changes
    ///   modsync sync --yes           # Apply everything
    ///   modsync sync --dry-run       # Only show what would change
    Sync {
        /// Apply without asking
        #[arg(short, long)]
        yes: bool,

        /// Show the plan without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Run unattended: apply silently and seed headless exclusions
        #[arg(long)]
        headless: bool,
    },

    /// Show the local sync state
    Status {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Discard staged updates and the pending removal list
    Rollback,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::parse_from(["modsync", "sync", "--yes", "--dry-run"]);
        assert_eq!(
            cli.command,
            Some(Commands::Sync {
                yes: true,
                dry_run: true,
                headless: false,
            })
        );
    }

    #[test]
    fn global_options_follow_subcommands() {
        let cli = Cli::parse_from(["modsync", "status", "--root", "/games/spt", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.root, Some(PathBuf::from("/games/spt")));
    }
}
