//! authgate
//!
//! An authenticating reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                       AUTHGATE                       │
//!                          │                                                      │
//!   Client Request         │  ┌─────────┐    ┌──────────┐    ┌──────────────┐     │
//!   ───────────────────────┼─▶│  http   │───▶│ mapping  │───▶│   routing    │     │
//!                          │  │ server  │    │  store   │    │ + auth gate  │     │
//!                          │  └─────────┘    └──────────┘    └──────┬───────┘     │
//!                          │                                        │             │
//!                          │                       ┌────────────────┴─────┐       │
//!                          │                       ▼                      ▼       │
//!   Client Response        │               ┌──────────────┐      ┌─────────────┐  │
//!   ◀──────────────────────┼───────────────│  http relay  │      │  ws relay   │◀─┼── Backend
//!                          │               └──────────────┘      └─────────────┘  │
//!                          │                                                      │
//!                          │  reserved: /health /login /logout /_authgate/api/*   │
//!                          │  cross-cutting: config, observability, lifecycle     │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use authgate::config::{load_config, ProxyConfig};
use authgate::lifecycle::{wait_for_signal, Shutdown};
use authgate::observability::{logging, metrics};
use authgate::HttpServer;

#[derive(Parser)]
#[command(name = "authgate")]
#[command(about = "Authenticating reverse proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "authgate starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        mappings = %config.mappings.path,
        relay_timeout_secs = config.timeouts.relay_secs,
        users = config.auth.users.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        _ = wait_for_signal(&shutdown) => {}
    }
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
