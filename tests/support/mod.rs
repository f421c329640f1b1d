// Shared helpers for booting a server and talking to it over WebSocket.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use skyline_sync::config::Config;

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Anything slower than this means the server is not responding.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// Config for tests: fixed seed, fast sweeps, generous admission.
pub fn test_config() -> Config {
    Config {
        world_seed: Some(1234),
        connect_rate_per_ip: 1_000,
        ..Config::default()
    }
}

// Start a server on an ephemeral port and return its address.
pub async fn start(config: Config) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        skyline_sync::serve(listener, config)
            .await
            .expect("server failed");
    });
    addr
}

pub async fn connect(addr: SocketAddr, path: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("websocket connect");
    ws
}

pub async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string()))
        .await
        .expect("send message");
}

// Connect to the room and complete the handshake, returning the welcome.
pub async fn join(addr: SocketAddr, name: &str) -> (Ws, Value) {
    let mut ws = connect(addr, "/room").await;
    send_json(&mut ws, serde_json::json!({"type": "hello", "name": name})).await;
    let welcome = next_of_type(&mut ws, "welcome").await;
    (ws, welcome)
}

// Next frame of any kind, or None once the socket is closed.
pub async fn next_message(ws: &mut Ws) -> Option<Message> {
    let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
        .await
        .expect("timed out waiting for a message");
    match msg {
        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => None,
        Some(Ok(msg)) => Some(msg),
    }
}

// Skip binary frames and unrelated events until a message of type `ty`.
pub async fn next_of_type(ws: &mut Ws, ty: &str) -> Value {
    loop {
        match next_message(ws).await.expect("socket closed") {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(&text).expect("valid json");
                if value["type"] == ty {
                    return value;
                }
            }
            _ => continue,
        }
    }
}

// Skip control messages until the next binary state frame.
pub async fn next_frame(ws: &mut Ws) -> Vec<u8> {
    loop {
        if let Message::Binary(frame) = next_message(ws).await.expect("socket closed") {
            return frame;
        }
    }
}
