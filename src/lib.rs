//! Skyline Sync - authoritative real-time multiplayer sync server
//!
//! One in-memory room per process. Clients connect over WebSocket, send JSON
//! control messages, and receive fixed-width binary state frames at 30 Hz.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::app::AppState;
use crate::config::Config;
use crate::game::Schedules;
use crate::http::build_router;
use crate::util::time::init_server_time;

/// Serve until the process is stopped
pub async fn serve(listener: TcpListener, config: Config) -> anyhow::Result<()> {
    serve_with_shutdown(listener, config, std::future::pending()).await
}

/// Serve until `shutdown` resolves, then stop the room schedules
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    config: Config,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    init_server_time();
    let addr = listener.local_addr()?;
    let sweep_interval = config.sweep_interval;
    let room_path = config.room_path.clone();

    let (state, room_service) = AppState::new(config);
    tokio::spawn(room_service.run());
    let schedules = Schedules::start(&state.room, sweep_interval);
    let limiter_pruner = spawn_limiter_pruner(&state, sweep_interval);

    let router = build_router(state);

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Room endpoint: ws://{}{}", addr, room_path);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    limiter_pruner.abort();
    schedules.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Keep the per-IP admission table from growing without bound
fn spawn_limiter_pruner(state: &AppState, period: Duration) -> tokio::task::JoinHandle<()> {
    let limiter = state.connect_limiter.clone();
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            timer.tick().await;
            limiter.prune();
        }
    })
}
