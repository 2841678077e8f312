mod admin;
mod app;
mod term;

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{Context, Result};
use clap::Parser;
use foundry_core::{
    config::{self, AppConfig, Overrides},
    identity::IdentityStore,
    net::{Dispatcher, GameClient, Poller},
};
use tokio::sync::mpsc;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Terminal client for the Foundry trading game.
#[derive(Debug, Parser)]
#[command(name = "foundry", version)]
struct Args {
    /// Game server base URL
    #[arg(long)]
    server: Option<String>,
    /// Poll interval in milliseconds
    #[arg(long = "poll-ms")]
    poll_ms: Option<u64>,
    /// Where the registered identity is stored
    #[arg(long)]
    identity: Option<PathBuf>,
    /// Open the operator dashboard instead of the player client
    #[arg(long)]
    admin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load(&Overrides {
        server_url: args.server,
        poll_interval_ms: args.poll_ms,
        identity_path: args.identity,
    })?;
    tracing::info!(server = %config.server_url, admin = args.admin, "starting foundry");

    let client = GameClient::from_config(&config).context("failed to build HTTP client")?;
    let (client_tx, client_rx) = mpsc::channel(32);

    if args.admin {
        let poller = Poller::admin(client, client_tx, config.poll_interval());
        tokio::spawn(poller.clone().run());
        let mut dashboard =
            admin::AdminApp::new(Dispatcher::new(poller), config.server_url.clone());
        dashboard.attach_client(client_rx);
        return dashboard.run().await;
    }

    let identity = IdentityStore::open(config.identity_path.clone());
    tracing::info!(identity = %identity.path().display(), "identity store opened");
    let poller = Poller::new(client, identity.clone(), client_tx, config.poll_interval());
    tokio::spawn(poller.clone().run());
    let dispatcher = Dispatcher::new(poller);

    let mut app = app::FoundryApp::new(identity, dispatcher, config.server_url.clone());
    app.attach_client(client_rx);
    app.run().await
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("foundry.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout belongs to the alternate screen, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
