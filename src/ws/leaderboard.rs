//! Leaderboard notification stream
//!
//! Connections on the default path receive every scoreboard refresh the room
//! publishes. Anything they send is ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::{AppState, ConnectionKind};
use crate::util::time::unix_millis;
use crate::ws::handler::{spawn_writer, Liveness, OUTBOUND_BUFFER};
use crate::ws::protocol::{Outbound, ServerMsg};

/// Buffered events per subscriber before it starts skipping
const LEADERBOARD_BUFFER: usize = 16;

/// Fan-out point for scoreboard events
#[derive(Clone, Debug)]
pub struct LeaderboardHub {
    tx: broadcast::Sender<Arc<str>>,
}

impl LeaderboardHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(LEADERBOARD_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    /// Publish a message to every subscriber. No subscribers is not an error.
    pub fn publish(&self, msg: &ServerMsg) {
        if self.tx.receiver_count() == 0 {
            return;
        }
        match serde_json::to_string(msg) {
            Ok(json) => {
                let _ = self.tx.send(json.into());
            }
            Err(e) => warn!(error = %e, "Failed to serialize leaderboard event"),
        }
    }
}

impl Default for LeaderboardHub {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler for the leaderboard stream
pub async fn leaderboard_ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if !state.connect_limiter.check(peer.ip()) {
        warn!(peer = %peer, "Leaderboard connection rate limited");
        return (StatusCode::TOO_MANY_REQUESTS, "Too many connections").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let conn_id = Uuid::new_v4();
    state
        .connections
        .insert(conn_id, ConnectionKind::Leaderboard, peer);
    info!(conn_id = %conn_id, peer = %peer, "Leaderboard subscriber connected");

    let (ws_sink, mut ws_stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let liveness = Liveness::new();
    let mut writer = spawn_writer(
        conn_id,
        ws_sink,
        out_rx,
        state.config.heartbeat_interval,
        liveness.clone(),
    );

    let mut events = state.leaderboard.subscribe();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(json) => {
                    if out_tx.send(Outbound::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(conn_id = %conn_id, skipped = n, "Leaderboard subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Pong(_))) => liveness.answered(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, error = %e, "Leaderboard socket error");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    forwarder.abort();
    writer.abort();
    let lived_ms = state
        .connections
        .remove(&conn_id)
        .map(|c| unix_millis().saturating_sub(c.opened_at));
    info!(conn_id = %conn_id, peer = %peer, lived_ms, "Leaderboard subscriber disconnected");
}
