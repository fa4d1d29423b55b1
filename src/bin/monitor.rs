//! KNX bus monitor
//!
//! Connects to a KNXnet/IP gateway and prints every CEMI frame the bus
//! delivers until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use knx_tunnel::config::Config;
use knx_tunnel::Tunnel;
use tracing::info;

/// KNX bus monitor - watch tunneled CEMI frames
#[derive(Parser, Debug)]
#[command(name = "knx-monitor")]
#[command(about = "Watch CEMI frames arriving from a KNXnet/IP gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Gateway address (overrides config)
    #[arg(short, long)]
    gateway: Option<String>,

    /// Log level (overrides config)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).context("Failed to load configuration")?,
        None => Config::default(),
    };

    let log_level = args.log_level.unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&log_level))
        .init();

    let gateway = args.gateway.unwrap_or_else(|| config.gateway.address.clone());

    info!("knx-monitor v{}", knx_tunnel::VERSION);
    info!("Gateway: {}", gateway);

    let mut tunnel = Tunnel::connect(gateway.as_str(), config.timings.client_config())
        .await
        .context("Failed to connect to gateway")?;

    info!(channel = tunnel.channel(), "Connected, watching the bus");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
            frame = tunnel.recv() => match frame {
                Some(data) => info!("cEMI {:02X?}", &data[..]),
                None => break,
            },
        }
    }

    tunnel.close().await.context("Connection ended abnormally")?;

    Ok(())
}
