//! x402 paid service template.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p upl-service --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p upl-service
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p upl-service
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `3000`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! Variables from a `.env` file in the working directory are loaded first.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use upl_http::constants::DEFAULT_TIMEOUT;
use upl_http::{RegistryClient, ServiceStatus};

use upl_service::config::ServiceConfig;
use upl_service::gate::PriceTag;
use upl_service::handlers::{AppState, router};
use upl_service::heartbeat::Heartbeat;
use upl_service::signal::ShutdownSignal;

/// Upper bound on the best-effort `PAUSED` status update at shutdown.
const PAUSE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Service failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        network = %config.network,
        price = %config.price,
        asset = %config.asset,
        "Loaded configuration"
    );

    let shutdown = ShutdownSignal::install()?;
    let registry =
        Arc::new(RegistryClient::new(config.registry_url.clone()).with_timeout(DEFAULT_TIMEOUT));

    let heartbeat = match config.service_registration() {
        Some(registration) => {
            match registry
                .register_service(&registration, &shutdown.token())
                .await
            {
                Ok(service_id) => {
                    tracing::info!(%service_id, "Registered with service registry");
                    Some(Heartbeat::start(
                        Arc::clone(&registry),
                        config.heartbeat_interval(),
                    ))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Registry registration failed; serving unlisted");
                    None
                }
            }
        }
        None => {
            tracing::info!("No [registration] section; skipping registry");
            None
        }
    };

    let state = AppState {
        service_name: config.service_name.clone(),
        network: config.network,
    };
    let price = PriceTag {
        network: config.network,
        asset: config.asset.clone(),
        pay_to: config.treasury_wallet.clone(),
        amount: config.price,
        description: config
            .registration
            .as_ref()
            .map_or_else(|| config.service_name.clone(), |r| r.description.clone()),
    };

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Service listening on http://{addr}");

    let stop_serving = CancellationToken::new();
    let server = tokio::spawn(
        axum::serve(listener, router(state, price))
            .with_graceful_shutdown(stop_serving.clone().cancelled_owned())
            .into_future(),
    );

    shutdown.wait().await;
    tracing::info!("Shutting down");

    if let Some(heartbeat) = heartbeat {
        heartbeat.stop().await;
    }
    if registry.service_id().is_some() {
        let detached = CancellationToken::new();
        let pause = registry.set_service_status(ServiceStatus::Paused, &detached);
        match tokio::time::timeout(PAUSE_TIMEOUT, pause).await {
            Ok(Ok(())) => tracing::info!("Marked service as paused"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to mark service as paused"),
            Err(_) => tracing::warn!("Timed out marking service as paused"),
        }
    }

    stop_serving.cancel();
    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "In-flight requests did not finish in time"
        ),
    }

    tracing::info!("Service shut down gracefully");
    Ok(())
}
