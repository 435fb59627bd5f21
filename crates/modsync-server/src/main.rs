//! ModSync server binary

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use modsync_fs::NormalizedPath;
use modsync_server::{Error, Result, ServerCatalogService, ServerConfig, router};
use tracing_subscriber::EnvFilter;

/// Serve mod files to ModSync clients
#[derive(Parser, Debug)]
#[command(name = "modsync-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON); created with defaults if missing
    #[arg(short, long, default_value = "modsync-server.toml", env = "MODSYNC_SERVER_CONFIG")]
    config: PathBuf,

    /// Override the install root from the configuration
    #[arg(long)]
    root: Option<PathBuf>,

    /// Override the bind address from the configuration
    #[arg(long)]
    bind: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "modsync_server=debug,modsync_core=debug,tower_http=debug"
    } else {
        "modsync_server=info,modsync_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = ServerConfig::load_or_init(&NormalizedPath::new(&cli.config))?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    config.root = dunce::canonicalize(&config.root)
        .map_err(|e| modsync_fs::Error::io(&config.root, e))?;

    let service = Arc::new(ServerCatalogService::from_config(&config)?);
    service.ensure_default_seed()?;

    for spec in service.sync_paths() {
        tracing::info!(
            path = %spec.path,
            name = %spec.name,
            enforced = spec.enforced,
            restart_required = spec.restart_required,
            "Serving sync path"
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(service, &config.bind))
}

async fn serve(service: Arc<ServerCatalogService>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| Error::config(format!("cannot listen on {bind}: {e}")))?;
    tracing::info!(root = %service.root(), "Listening on http://{}", bind);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
