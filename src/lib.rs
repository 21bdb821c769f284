//! lgtm-agent - LGTM image generator agent server
//!
//! Exposes image generation and persistence tools to an external agent
//! runtime, lists stored images, and fronts the runtime's own API.

pub mod agent;
pub mod api;
pub mod artifacts;
pub mod config;
pub mod gemini;
pub mod storage;
pub mod telemetry;
pub mod tools;

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

pub use api::AppState;
pub use config::{Config, Environment};

/// The lgtm-agent server instance
pub struct Server {
    bind_addr: SocketAddr,
    state: AppState,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a server wired to Gemini and the configured bucket
    pub fn new(config: Config) -> Result<Self> {
        let bind_addr = config.bind_addr();
        let state = AppState::from_config(config)?;
        Ok(Self::with_state(bind_addr, state))
    }

    /// Create a server around prepared state
    pub fn with_state(bind_addr: SocketAddr, state: AppState) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            bind_addr,
            state,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Shared application state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router
    fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// Run the server until shutdown
    ///
    /// After a shutdown signal, in-flight requests get the configured grace
    /// period to finish before the server task is aborted.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("lgtm-agent listening on {}", local_addr);

        let router = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut serve = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.changed().await.ok();
                })
                .await
        });

        let mut drain_rx = self.shutdown_rx.clone();
        tokio::select! {
            result = &mut serve => {
                result??;
                info!("lgtm-agent shutdown complete");
                return Ok(());
            }
            _ = drain_rx.changed() => {}
        }

        let grace = self.state.config.shutdown_grace();
        info!("graceful shutdown, waiting up to {:?}", grace);
        match tokio::time::timeout(grace, &mut serve).await {
            Ok(result) => result??,
            Err(_) => {
                warn!("in-flight requests did not finish within {:?}, closing", grace);
                serve.abort();
            }
        }

        info!("lgtm-agent shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}
