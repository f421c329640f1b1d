//! WebSocket upgrade handler for room connections

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::{AppState, ConnectionKind};
use crate::util::rate_limit::InputRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, Outbound};

/// Frames buffered per connection before the room starts dropping them
pub const OUTBOUND_BUFFER: usize = 64;

/// Tracks whether the last transport ping has been answered
#[derive(Clone, Debug, Default)]
pub struct Liveness {
    awaiting_pong: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pong from the peer
    pub fn answered(&self) {
        self.awaiting_pong.store(false, Ordering::Relaxed);
    }

    /// Mark a ping as sent. Returns false if the previous one is still unanswered.
    fn probe(&self) -> bool {
        !self.awaiting_pong.swap(true, Ordering::Relaxed)
    }
}

/// WebSocket upgrade handler
pub async fn room_ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if !state.connect_limiter.check(peer.ip()) {
        warn!(peer = %peer, "Room connection rate limited");
        return (StatusCode::TOO_MANY_REQUESTS, "Too many connections").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, peer = %peer, "New room connection");

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    if !state.room.attach(conn_id, out_tx).await {
        error!(conn_id = %conn_id, "Room is not running, dropping connection");
        return;
    }
    state.connections.insert(conn_id, ConnectionKind::Room, peer);

    let (ws_sink, ws_stream) = socket.split();
    let liveness = Liveness::new();
    let writer = spawn_writer(
        conn_id,
        ws_sink,
        out_rx,
        state.config.heartbeat_interval,
        liveness.clone(),
    );

    run_session(conn_id, &state, ws_stream, writer, liveness).await;

    // Cleanup on disconnect
    state.room.detach(conn_id).await;
    let lived_ms = state
        .connections
        .remove(&conn_id)
        .map(|c| unix_millis().saturating_sub(c.opened_at));
    info!(conn_id = %conn_id, peer = %peer, lived_ms, "Room connection closed");
}

/// Reader loop: WebSocket -> room, until either side ends
async fn run_session(
    conn_id: Uuid,
    state: &AppState,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut writer: JoinHandle<()>,
    liveness: Liveness,
) {
    let mut rate_limiter = InputRateLimiter::default();

    loop {
        let frame = tokio::select! {
            frame = ws_stream.next() => frame,
            _ = &mut writer => {
                debug!(conn_id = %conn_id, "Writer finished, ending session");
                return;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if !rate_limiter.check() {
                    debug!(conn_id = %conn_id, "Rate limited control message");
                    continue;
                }

                match ClientMsg::parse(&text) {
                    Ok(msg) => {
                        if !state.room.submit(conn_id, msg).await {
                            debug!(conn_id = %conn_id, "Room channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(conn_id = %conn_id, error = %e, "Dropped undecodable message");
                    }
                }
            }
            Some(Ok(Message::Binary(_))) => {
                debug!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Some(Ok(Message::Ping(_))) => {}
            Some(Ok(Message::Pong(_))) => liveness.answered(),
            Some(Ok(Message::Close(_))) | None => {
                debug!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Some(Err(e)) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer.abort();
}

/// Writer task: outbound channel and heartbeat -> WebSocket.
///
/// Ends (closing the socket) when the channel closes, a `Close` is queued,
/// a send fails, or a heartbeat ping goes unanswered.
pub fn spawn_writer(
    conn_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    heartbeat: Duration,
    liveness: Liveness,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut probe = interval_at(Instant::now() + heartbeat, heartbeat);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let msg = tokio::select! {
                out = rx.recv() => match out {
                    Some(Outbound::Text(text)) => Message::Text(text.to_string()),
                    Some(Outbound::Binary(bytes)) => Message::Binary(bytes.to_vec()),
                    Some(Outbound::Close) | None => break,
                },
                _ = probe.tick() => {
                    if !liveness.probe() {
                        info!(conn_id = %conn_id, "Heartbeat unanswered, closing connection");
                        break;
                    }
                    Message::Ping(Vec::new())
                }
            };

            if let Err(e) = ws_sink.send(msg).await {
                debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                return;
            }
        }

        let _ = ws_sink.send(Message::Close(None)).await;
        let _ = ws_sink.close().await;
    })
}
