//! stamp-proxy
//!
//! Intercepting HTTP proxy built with Tokio, Hyper and Axum. Every response
//! relayed to a client carries a header whose name depends on the local
//! port the client connected to.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────────┐
//!                         │                    STAMP PROXY                     │
//!     Client Request      │  ┌──────────┐    ┌──────────┐    ┌─────────────┐  │
//!     ────────────────────┼─▶│   net    │───▶│   http   │───▶│  upstream   │──┼──▶ Origin
//!       (port 8091/8092)  │  │ listener │    │  server  │    │   client    │  │
//!                         │  └──────────┘    └──────────┘    └──────┬──────┘  │
//!                         │                                         │         │
//!     Client Response     │  ┌──────────┐    ┌──────────────────┐   │         │
//!     ◀───────────────────┼──│   http   │◀───│ stamp::FlowHook  │◀──┘         │
//!                         │  │  server  │    │ registry + audit │             │
//!                         │  └──────────┘    └──────────────────┘             │
//!                         │                                                   │
//!                         │  config · observability · lifecycle               │
//!                         └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use stamp_proxy::config::{load_config, ProxyConfig};
use stamp_proxy::lifecycle::{self, Shutdown};
use stamp_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "stamp-proxy", version)]
#[command(about = "HTTP proxy that stamps responses with a per-listener header", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if cli.check {
        println!("configuration OK ({} listeners)", config.listeners.len());
        return Ok(());
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        listeners = config.listeners.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "stamp-proxy starting"
    );

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let _signal_task = shutdown.trigger_on_signal();

    lifecycle::run(config, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
