//! # vanished-server
//!
//! Room broker for Vanished Rooms.
//!
//! This binary provides:
//! - **Line protocol** over TCP and WebSocket: handshake, room commands,
//!   chat relay
//! - **Key relay** between a room's host and its members. Room keys only
//!   ever pass through as RSA-wrapped blobs
//! - **Ephemeral store** (SQLite) of live users and rooms, purged at startup
//!   and at shutdown
//! - **HTTP probes** (axum) for health checks and instance info
//! - **Per-IP rate limiting** and a connection cap

mod admission;
mod api;
mod commands;
mod config;
mod connection;
mod error;
mod registry;
mod relay;
mod state;
mod transport;

#[cfg(test)]
mod concurrency;
#[cfg(test)]
mod scenario;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vanished_shared::password::Argon2Hasher;
use vanished_store::Database;

use crate::config::ServerConfig;
use crate::state::AppState;

const SHUTDOWN_NOTICE: &str = "Server is shutting down. All rooms are being erased.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vanished_server=debug")),
        )
        .init();

    info!("Starting Vanished Rooms broker v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open(&config.database_path)?;

    let hasher = Argon2Hasher::with_params(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
    )?;

    let state = AppState::new(config.clone(), db, Arc::new(hasher));

    // Rows left behind by a crash belong to sessions that no longer exist.
    state.purge().await?;

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let gate = state.gate.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            gate.forget_idle(Duration::from_secs(600)).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Bind listeners
    // -----------------------------------------------------------------------
    let tcp_listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let tcp = tokio::spawn(transport::serve_tcp(state.clone(), tcp_listener));
    let http = tokio::spawn(api::serve(state.clone(), config.http_addr));

    // -----------------------------------------------------------------------
    // 6. Run until a listener fails or a shutdown signal arrives
    // -----------------------------------------------------------------------
    let outcome = tokio::select! {
        result = tcp => flatten("TCP listener", result),
        result = http => flatten("HTTP server", result),
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    // -----------------------------------------------------------------------
    // 7. Erase everything before exiting
    // -----------------------------------------------------------------------
    let notified = state.shutdown_sessions(SHUTDOWN_NOTICE).await;
    info!(sessions = notified, "Notified live sessions");

    // Give connection tasks a moment to run their own teardown.
    if !state.registry.is_empty().await {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    if let Err(e) = state.purge().await {
        error!(error = %e, "Shutdown purge failed");
    }

    outcome
}

fn flatten(
    what: &str,
    result: Result<anyhow::Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match result {
        Ok(Ok(())) => {
            warn!("{what} stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "{what} failed");
            Err(e)
        }
        Err(e) => {
            error!(error = %e, "{what} task panicked");
            Err(e.into())
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
