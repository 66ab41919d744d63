//! Makeshiftd: a makeshift HTTP document server
//!
//! Serves named workspace directories under `/<workspace>/`: GET serves
//! files, POST creates them, PUT replaces them, and a `!` in front of a
//! path segment runs the script behind the document.
//!
//! Usage:
//!   makeshiftd                                   # Search for makeshiftd.{toml,json}
//!   makeshiftd --config ./makeshiftd.toml        # Explicit configuration file
//!   makeshiftd --port 9000 --host 127.0.0.1      # Override the listen address
//!
//! Signals: the first Ctrl-C stops accepting connections and waits for
//! in-flight requests, the second abandons them, the third exits at once.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mksht_server::{AppConfig, RequestRouter, WorkspaceRegistry};
use mksht_transport::{HttpServer, ServeError, ShutdownCoordinator, signal_feed};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "makeshiftd", about = "Makeshiftd: HTTP document server")]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind to (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the configuration file, 0 for OS-assigned)
    #[arg(long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

/// Exit code when in-flight requests had to be abandoned.
const DRAIN_INTERRUPTED_CODE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            exit_code_for(&e)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let registry = Arc::new(WorkspaceRegistry::from_config(&config));
    if registry.is_empty() {
        warn!("No workspaces could be registered; only / will answer");
    }

    let coordinator = Arc::new(ShutdownCoordinator::new(config.server.grace_period()));
    let signals = signal_feed();
    let server = HttpServer::bind(&config.server.bind_address()).await?;
    let addr = server.local_addr();

    println!();
    println!("  Makeshiftd");
    println!();
    if let Some(source) = config.source() {
        println!("  Config:     {}", source.display());
    }
    println!("  Listening:  http://{addr}");
    println!("  Grace:      {:?}", coordinator.grace_period());
    for workspace in registry.list() {
        println!("  Workspace:  /{:<12} {}", workspace.slug(), workspace.root().display());
    }
    println!();

    let router =
        RequestRouter::new(registry.clone(), coordinator.in_flight_scope().clone()).into_router();
    let result = server.run(router, coordinator, signals).await;

    registry.shutdown_all();
    result?;

    info!("Makeshiftd stopped");
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<ServeError>() {
        Some(ServeError::DrainInterrupted) => ExitCode::from(DRAIN_INTERRUPTED_CODE),
        _ => ExitCode::FAILURE,
    }
}
