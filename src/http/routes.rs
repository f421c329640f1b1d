//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::{AppState, ConnectionSummary};
use crate::util::time::{unix_millis, uptime_secs};
use crate::ws::{leaderboard_ws_handler, room_ws_handler};

/// Build the application router.
///
/// The room lives on the configured path; every other path upgrades to the
/// leaderboard stream.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(&state.config.room_path, get(room_ws_handler))
        .fallback(leaderboard_ws_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(state.config.client_origin.as_deref())),
        )
        .with_state(state)
}

/// CORS for the HTTP endpoints. Origins are comma-separated; unset means any.
fn cors_layer(client_origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    match client_origin {
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();
            cors.allow_origin(allowed)
        }
        None => cors.allow_origin(Any),
    }
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_id: Option<String>,
    tick: u64,
    players: usize,
    connections: ConnectionCounts,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionCounts {
    room: usize,
    leaderboard: usize,
    distinct_peers: usize,
    oldest_secs: u64,
}

impl From<ConnectionSummary> for ConnectionCounts {
    fn from(summary: ConnectionSummary) -> Self {
        Self {
            room: summary.room,
            leaderboard: summary.leaderboard,
            distinct_peers: summary.distinct_peers,
            oldest_secs: summary.oldest_age_ms / 1_000,
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let connections = ConnectionCounts::from(state.connections.summary(unix_millis()));

    match state.room.stats().await {
        Some(stats) => Json(HealthResponse {
            status: "ok",
            uptime_secs: uptime_secs(),
            room_id: Some(stats.room_id.to_string()),
            tick: stats.tick,
            players: stats.players,
            connections,
        })
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "room-unavailable",
                uptime_secs: uptime_secs(),
                room_id: None,
                tick: 0,
                players: 0,
                connections,
            }),
        )
            .into_response(),
    }
}
