//! muninnd: Muninn daemon.
//!
//! Runs the [`OfflineGateway`](muninn::OfflineGateway) as a reverse proxy
//! in front of a static site's origin server.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use muninn::server::{self, Config};

/// Muninn daemon: offline-first caching proxy.
#[derive(Parser)]
#[command(name = "muninnd")]
#[command(version = muninn::PKG_VERSION)]
#[command(about = "Muninn offline-first caching proxy")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "MUNINN_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;
    let gateway = Arc::new(config.gateway_builder()?.build()?);

    let listener = TcpListener::bind(&config.server.address).await.map_err(|e| {
        muninn::MuninnError::Configuration(format!(
            "Failed to bind {}: {e}",
            config.server.address
        ))
    })?;

    info!(
        version = muninn::version_string(),
        address = %config.server.address,
        origin = %config.origin.url,
        generation = gateway.generation(),
        "muninnd starting"
    );

    // An install failure leaves the previous generation serving; the next
    // navigation retries it.
    match gateway.start().await {
        Ok(state) => info!(%state, current = ?gateway.current_generation(), "lifecycle started"),
        Err(e) => warn!(error = %e, current = ?gateway.current_generation(), "initial install failed"),
    }

    let app = server::router(gateway.clone(), config.server.max_body_bytes);
    server::serve(listener, app, shutdown_signal()).await?;

    gateway.flush().await;
    info!("muninnd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
