//! MEGA relay server binary.
//!
//! Accepts multipart uploads over HTTP, stages them on local disk and forwards
//! them to a folder in a MEGA account, removing the staged copy afterwards.
//! The main entry point parses configuration, builds the Axum router and
//! serves it until a shutdown signal arrives.

mod auth;
mod background;
mod config;
mod dashboard;
mod error;
mod http;
mod logging;
mod megacmd;
mod remote;
mod router;
mod session;
mod staging;
mod upload;
mod version;

use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use crate::background::spawn_background_tasks;
use crate::config::{Args, RelayConfig};
use crate::http::build_cors_layer;
use crate::megacmd::{MegaCmd, MegaCmdConnector};
use crate::session::SessionManager;
use crate::staging::Staging;

shadow!(build);

/// Starts the relay and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let config = Arc::new(RelayConfig::from_args(&args));
    if config.credentials.is_none() {
        warn!("MEGA_EMAIL/MEGA_PASSWORD not set, uploads will report the service as unavailable");
    }
    if config.api_key.is_none() {
        warn!("RELAY_API_KEY not set, /upload accepts unauthenticated requests");
    }

    let staging = Arc::new(Staging::new(
        config.staging_dir.clone(),
        config.max_upload_size,
    ));
    staging.ensure_root().await?;

    let sessions = Arc::new(SessionManager::new(
        Arc::new(MegaCmdConnector::new(MegaCmd::new(config.megacmd_dir.clone()))),
        config.credentials.clone(),
        config.relogin_after,
    ));
    if args.connect_on_start {
        match sessions.session().await {
            Ok(_) => info!(folder = %config.folder_name, "connected to MEGA"),
            Err(err) => warn!(error = %err, "could not connect to MEGA at startup"),
        }
    }

    let mut app = router::build_router(config.clone(), sessions, staging.clone());
    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        staging_dir = ?config.staging_dir,
        folder = %config.folder_name,
        "Starting HTTP server at {}",
        addr
    );
    spawn_background_tasks(staging, config.staging_ttl);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
}
