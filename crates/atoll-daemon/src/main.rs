//! `atolld` - the Atoll session daemon binary.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use atoll_config::Config;
use atoll_daemon::Daemon;

/// Watch an AI coding assistant's sessions and mediate tool approvals.
#[derive(Debug, Parser)]
#[command(name = "atolld", version, about)]
struct Cli {
    /// Path to the config file (default: ~/.config/atoll/config.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured log level (trace|debug|info|warn|error).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the sessions root to watch.
    #[arg(long, value_name = "DIR")]
    sessions_root: Option<PathBuf>,

    /// Override the hook socket path.
    #[arg(long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Override the frontend socket path.
    #[arg(long, value_name = "PATH")]
    frontend_socket_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(root) = cli.sessions_root {
        config.sessions_root = root;
    }
    if let Some(path) = cli.socket_path {
        config.socket_path = path;
    }
    if let Some(path) = cli.frontend_socket_path {
        config.frontend_socket_path = path;
    }

    init_tracing(&config.log_level);
    Daemon::run(config).await.context("running daemon")?;
    Ok(())
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
