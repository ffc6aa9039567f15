//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Bind listeners and begin accepting traffic
//! - Wire OS signals to graceful shutdown
//!
//! # Design Decisions
//! - Fail fast on a missing backend list or when no listener can start
//! - A failing metrics endpoint is logged, not fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;

use crate::config::ProxyConfig;
use crate::http::server::{ProxyServer, StartupError};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

/// Run the proxy until a shutdown signal arrives and connections drain.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = ProxyServer::new(config)?.bind().await?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match signals::wait_for_signal().await {
            Ok(signal) => tracing::info!(signal, "Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Signal handler failed, shutting down"),
        }
        trigger.trigger();
    });

    server.serve(shutdown).await;
    Ok(())
}
