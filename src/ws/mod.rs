//! WebSocket gateway: wire protocol and connection handlers

pub mod handler;
pub mod leaderboard;
pub mod protocol;

pub use handler::room_ws_handler;
pub use leaderboard::{leaderboard_ws_handler, LeaderboardHub};
