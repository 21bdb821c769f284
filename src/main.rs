//! lgtm-agent - LGTM image generator agent server

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use lgtm_agent::{telemetry, Config, Server};
use tracing::info;

/// LGTM image generator agent server
#[derive(Parser, Debug)]
#[command(name = "lgtm-agent", version, about)]
struct Args {
    /// TOML config file (defaults to ./lgtm-agent.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overrides PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }

    telemetry::init(config.env);
    info!("Loaded configuration: {:?}", config);

    let server = Arc::new(Server::new(config)?);
    let signal_server = server.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_server.shutdown();
    });

    server.run().await
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
