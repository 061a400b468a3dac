//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order: metrics, routing and pools, TLS,
//!   then listeners (traffic only when ready)

use std::net::SocketAddr;

use crate::config::ProxyConfig;
use crate::http::server::{EdgeServer, ServerError};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

/// Build the server from a validated config and run it until a signal.
pub async fn start(config: ProxyConfig) -> Result<(), ServerError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = EdgeServer::new(config)?;
    for pool in server.pools().pools() {
        for endpoint in pool.endpoints() {
            metrics::record_endpoint_available(pool.name(), &endpoint.to_string(), true);
        }
    }

    let shutdown = Shutdown::new();
    let signals = signals::spawn_signal_handler(shutdown.clone());

    let result = server.run(&shutdown).await;
    signals.abort();

    tracing::info!("Shutdown complete");
    result
}
