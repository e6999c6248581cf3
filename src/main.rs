//! Duel Server
//!
//! Pairs players first come, first served into timed 1v1 matches, relays
//! their movement and fire, and decides each match by kills or, when the
//! clock runs out, by kills then remaining HP. Clients speak JSON frames
//! over `/ws`; `/health` and `/matches/:id` are read-only.

mod app;
mod config;
mod game;
mod http;
mod matchmaking;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config.log_level);
    init_server_time();

    info!(addr = %config.server_addr, "Starting duel server");
    info!(
        max_queue_size = config.limits.max_queue_size,
        max_active_matches = config.limits.max_active_matches,
        retention_secs = config.match_settings.retention.as_secs(),
        "Capacity limits loaded"
    );
    info!(
        duration_secs = config.match_settings.duration.as_secs(),
        kill_threshold = config.match_settings.kill_threshold,
        initial_hp = config.match_settings.initial_hp,
        entry_fee = %config.match_settings.entry_fee,
        "Match rules loaded"
    );

    // Queue, connections and matches all live in this one task
    let (state, matchmaking) = AppState::new(config.clone());
    let service_task = tokio::spawn(matchmaking.run());

    let router = build_router(state);
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Accepting players on ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Upgraded sockets may still hold handles; in-flight matches end with the process
    service_task.abort();
    info!("Duel server stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, draining connections");
        }
        _ = terminate => {
            info!("SIGTERM received, draining connections");
        }
    }
}
