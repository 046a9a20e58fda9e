//! Edge gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────┐
//!                        │                  EDGE GATEWAY                  │
//!   Client Request       │  ┌────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ─────────────────────┼─▶│  http  │──▶│  router  │──▶│   endpoint   │  │
//!                        │  │ server │   │ (axum)   │   │   handler    │  │
//!                        │  └────────┘   └──────────┘   └──────┬───────┘  │
//!                        │                                     │          │
//!                        │                    ┌────────────────▼───────┐  │
//!                        │                    │ proxy pipeline         │  │
//!                        │                    │ request builder        │  │
//!                        │                    │ → hedging → HTTP call  │──┼──▶ Backends
//!                        │                    └────────────────┬───────┘  │
//!   Client Response      │  ┌────────┐                         │          │
//!   ◀────────────────────┼──│ render │◀────────────────────────┘          │
//!                        │  └────────┘                                    │
//!                        │  config · observability · lifecycle            │
//!                        └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::load_config;
use edge_gateway::lifecycle::{signals, Shutdown};
use edge_gateway::observability::{logging, metrics};
use edge_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "API gateway fanning endpoints out to backend services", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Enable the debug endpoint and debug logging
    #[arg(short, long)]
    debug: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if cli.debug {
        config.debug = true;
        config.observability.log_level = "debug".to_string();
    }

    logging::init(&config.observability)?;

    tracing::info!(
        service = %config.name,
        version = config.version.as_deref().unwrap_or("undefined"),
        bind_address = %config.listener.bind_address,
        endpoints = config.endpoints.len(),
        timeout = ?config.timeout,
        "Configuration loaded"
    );

    if cli.check {
        tracing::info!(path = %cli.config.display(), "Configuration is valid");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    signals::spawn_signal_listener(shutdown);

    HttpServer::new(config).run(listener, stop).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
