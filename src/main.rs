//! circuit-rpc gateway.
//!
//! Serves a local JSON-RPC endpoint. Every call is sent to each backend over
//! independent circuits, and answered only with what the backends agree on.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use circuit_rpc::config::{load_config, GatewayConfig};
use circuit_rpc::lifecycle::{build_services, signals, Shutdown};
use circuit_rpc::observability::{logging, metrics};
use circuit_rpc::GatewayServer;

#[derive(Parser)]
#[command(name = "circuit-rpc")]
#[command(about = "Consensus JSON-RPC gateway over anonymizing circuits", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("circuit-rpc v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        provider = ?config.circuits.provider,
        circuits = config.circuits.count,
        ping_ms = config.timeouts.ping_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let services = build_services(config, &shutdown)?;
    let server = GatewayServer::new(services);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
