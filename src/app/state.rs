//! Application state shared across routes

use dashmap::DashMap;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::game::snapshot::InterestPolicy;
use crate::game::spawn::random_seed;
use crate::game::{Room, RoomHandle, RoomService, RoomSettings};
use crate::util::rate_limit::ConnectionLimiter;
use crate::util::time::unix_millis;
use crate::ws::leaderboard::LeaderboardHub;

/// Which stream a connection was routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Room,
    Leaderboard,
}

/// An open connection, as seen from outside the room
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub kind: ConnectionKind,
    pub peer: SocketAddr,
    pub opened_at: u64,
}

/// Aggregate view of the open connections, for health reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub room: usize,
    pub leaderboard: usize,
    /// Distinct client IPs across both streams
    pub distinct_peers: usize,
    /// Age of the longest-lived connection
    pub oldest_age_ms: u64,
}

/// Registry of all open connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: DashMap<Uuid, ConnectionInfo>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn_id: Uuid, kind: ConnectionKind, peer: SocketAddr) {
        self.conns.insert(
            conn_id,
            ConnectionInfo {
                kind,
                peer,
                opened_at: unix_millis(),
            },
        );
    }

    pub fn remove(&self, conn_id: &Uuid) -> Option<ConnectionInfo> {
        self.conns.remove(conn_id).map(|(_, info)| info)
    }

    pub fn summary(&self, now: u64) -> ConnectionSummary {
        let mut summary = ConnectionSummary::default();
        let mut peers = HashSet::new();
        for entry in self.conns.iter() {
            let info = entry.value();
            match info.kind {
                ConnectionKind::Room => summary.room += 1,
                ConnectionKind::Leaderboard => summary.leaderboard += 1,
            }
            peers.insert(info.peer.ip());
            summary.oldest_age_ms = summary.oldest_age_ms.max(now.saturating_sub(info.opened_at));
        }
        summary.distinct_peers = peers.len();
        summary
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub room: RoomHandle,
    pub leaderboard: LeaderboardHub,
    pub connections: Arc<ConnectionRegistry>,
    pub connect_limiter: ConnectionLimiter,
}

impl AppState {
    /// Build the state and the room actor. The caller spawns the actor.
    pub fn new(config: Config) -> (Self, RoomService) {
        let config = Arc::new(config);
        let leaderboard = LeaderboardHub::new();

        let room = Room::new(
            RoomSettings {
                world_seed: config.world_seed.unwrap_or_else(random_seed),
                idle_timeout_ms: config.idle_timeout.as_millis() as u64,
                interest: InterestPolicy {
                    radius: config.interest_radius,
                    min_players: config.interest_min_players,
                },
            },
            leaderboard.clone(),
        );
        let (service, room) = RoomService::new(room);

        let state = Self {
            connect_limiter: ConnectionLimiter::new(config.connect_rate_per_ip),
            config,
            room,
            leaderboard,
            connections: Arc::new(ConnectionRegistry::new()),
        };
        (state, service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_summarizes_open_connections() {
        let registry = ConnectionRegistry::new();
        let local: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let remote: SocketAddr = "10.0.0.7:41000".parse().unwrap();
        let a = Uuid::new_v4();
        registry.insert(a, ConnectionKind::Room, local);
        registry.insert(Uuid::new_v4(), ConnectionKind::Room, local);
        registry.insert(Uuid::new_v4(), ConnectionKind::Leaderboard, remote);

        let now = unix_millis() + 1_500;
        let summary = registry.summary(now);
        assert_eq!(summary.room, 2);
        assert_eq!(summary.leaderboard, 1);
        assert_eq!(summary.distinct_peers, 2);
        assert!(summary.oldest_age_ms >= 1_500);

        let removed = registry.remove(&a).unwrap();
        assert_eq!(removed.kind, ConnectionKind::Room);
        assert_eq!(removed.peer, local);
        assert!(registry.remove(&a).is_none());
        assert_eq!(registry.summary(now).room, 1);
    }
}
