//! Room state: the authoritative player registry and its operations
//!
//! The room is owned by exactly one task (see `service`). Everything in here
//! is synchronous and takes the current wall-clock time as an argument, so the
//! same code runs under the real scheduler and in tests.

use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::tick_delta;
use crate::ws::leaderboard::LeaderboardHub;
use crate::ws::protocol::{
    ClientMsg, Outbound, PlayerInfo, ScoreEntry, ServerMsg, ShootRequest,
};

use super::combat::{
    CombatSystem, Shot, Target, WeaponStats, MAX_HEALTH, MAX_SHIELD, RESPAWN_INVULNERABILITY_MS,
};
use super::physics::{PhysicsSystem, COLLISION_COOLDOWN_MS};
use super::player::{ConnId, Input, Player, State};
use super::registry::{new_player_id, NumIdPool};
use super::snapshot::{encode_frame, InterestPolicy, StateRecord};
use super::spawn::{pick_spawn, player_color, world_checksum};

/// Room construction parameters
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub world_seed: u32,
    /// Players silent for longer than this are evicted
    pub idle_timeout_ms: u64,
    pub interest: InterestPolicy,
}

/// A connection attached to the room, joined or not
#[derive(Debug)]
struct Peer {
    tx: mpsc::Sender<Outbound>,
    num_id: Option<u16>,
}

/// Point-in-time figures for health reporting
#[derive(Debug, Clone, PartialEq)]
pub struct RoomStats {
    pub room_id: Uuid,
    pub world_seed: u32,
    pub tick: u64,
    pub players: usize,
    pub connections: usize,
}

/// The authoritative room
pub struct Room {
    id: Uuid,
    world_seed: u32,
    world_checksum: String,
    tick: u64,
    /// Keyed by numeric id so frames and pair checks have a stable order
    players: BTreeMap<u16, Player>,
    peers: HashMap<ConnId, Peer>,
    num_ids: NumIdPool,
    spawn_index: u32,
    idle_timeout_ms: u64,
    interest: InterestPolicy,
    leaderboard: LeaderboardHub,
}

impl Room {
    pub fn new(settings: RoomSettings, leaderboard: LeaderboardHub) -> Self {
        Self {
            id: Uuid::new_v4(),
            world_seed: settings.world_seed,
            world_checksum: world_checksum(settings.world_seed),
            tick: 0,
            players: BTreeMap::new(),
            peers: HashMap::new(),
            num_ids: NumIdPool::new(),
            spawn_index: 0,
            idle_timeout_ms: settings.idle_timeout_ms,
            interest: settings.interest,
            leaderboard,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn world_seed(&self) -> u32 {
        self.world_seed
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, num_id: u16) -> Option<&Player> {
        self.players.get(&num_id)
    }

    /// The player bound to a connection, if it has completed the handshake
    pub fn player_for(&self, conn_id: ConnId) -> Option<&Player> {
        let num_id = self.peers.get(&conn_id)?.num_id?;
        self.players.get(&num_id)
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            room_id: self.id,
            world_seed: self.world_seed,
            tick: self.tick,
            players: self.players.len(),
            connections: self.peers.len(),
        }
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Register a freshly accepted connection. It stays idle until `hello`.
    pub fn attach(&mut self, conn_id: ConnId, tx: mpsc::Sender<Outbound>) {
        self.peers.insert(conn_id, Peer { tx, num_id: None });
        debug!(conn_id = %conn_id, "Connection attached");
    }

    /// Forget a connection, removing its player if it had one
    pub fn detach(&mut self, conn_id: ConnId) {
        if let Some(peer) = self.peers.remove(&conn_id) {
            if let Some(num_id) = peer.num_id {
                self.remove_player(num_id, "disconnected");
            }
            debug!(conn_id = %conn_id, "Connection detached");
        }
    }

    /// Route one sanitized client message
    pub fn handle_message(&mut self, conn_id: ConnId, msg: ClientMsg, now: u64) {
        match msg {
            ClientMsg::Hello { name } => {
                self.handle_hello(conn_id, name, now);
            }
            ClientMsg::Input(input) => self.apply_input(conn_id, input, now),
            ClientMsg::Shoot(request) => self.resolve_shot(conn_id, request, now),
            ClientMsg::Ping { t } => self.handle_ping(conn_id, t, now),
            ClientMsg::Score { score } => self.set_score(conn_id, score, now),
        }
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Join a connection to the room. Returns the new player's id.
    ///
    /// A repeated hello, a hello from an unknown connection, or a hello when
    /// every numeric id is taken is ignored without a reply.
    pub fn handle_hello(&mut self, conn_id: ConnId, name: String, now: u64) -> Option<String> {
        let peer = self.peers.get(&conn_id)?;
        if peer.num_id.is_some() {
            debug!(conn_id = %conn_id, "Duplicate hello ignored");
            return None;
        }

        let Some(num_id) = self.num_ids.allocate() else {
            warn!(conn_id = %conn_id, "No numeric ids left, hello ignored");
            return None;
        };

        let spawn = pick_spawn(self.world_seed, self.next_spawn_index());
        let player = Player::new(
            new_player_id(),
            num_id,
            conn_id,
            name,
            player_color(num_id),
            State::at_rest(now, spawn.position, spawn.yaw, spawn.orientation),
            now,
        );
        let player_id = player.id.clone();
        let info = PlayerInfo::from(&player);

        self.players.insert(num_id, player);
        if let Some(peer) = self.peers.get_mut(&conn_id) {
            peer.num_id = Some(num_id);
        }

        let welcome = ServerMsg::Welcome {
            player_id: player_id.clone(),
            room_id: self.id.to_string(),
            world_seed: self.world_seed,
            world_checksum: self.world_checksum.clone(),
            players: self.players.values().map(PlayerInfo::from).collect(),
        };
        self.send_msg(conn_id, &welcome);
        self.broadcast_msg(&ServerMsg::PlayerAdd(info), Some(conn_id));
        self.broadcast_room_stats();

        info!(
            room_id = %self.id,
            player_id = %player_id,
            num_id,
            player_count = self.players.len(),
            "Player joined room"
        );
        Some(player_id)
    }

    // ========================================================================
    // Input pipeline
    // ========================================================================

    /// Store the latest control state. Integration happens on the next tick.
    pub fn apply_input(&mut self, conn_id: ConnId, input: Input, now: u64) {
        if let Some(player) = self.joined_player_mut(conn_id) {
            player.input = input;
            player.last_seen = now;
        }
    }

    fn handle_ping(&mut self, conn_id: ConnId, t_client: f64, now: u64) {
        let Some(player) = self.joined_player_mut(conn_id) else {
            return;
        };
        player.last_seen = now;
        self.send_msg(
            conn_id,
            &ServerMsg::Pong {
                t_server: now,
                t_client,
            },
        );
    }

    fn set_score(&mut self, conn_id: ConnId, score: f64, now: u64) {
        let Some(player) = self.joined_player_mut(conn_id) else {
            return;
        };
        player.last_seen = now;
        if player.score != score {
            player.score = score;
            self.broadcast_room_stats();
        }
    }

    // ========================================================================
    // Simulation tick
    // ========================================================================

    /// Advance every ship one fixed step, resolve collisions, then broadcast.
    pub fn tick(&mut self, now: u64) {
        self.tick += 1;
        let dt = tick_delta();

        for player in self.players.values_mut() {
            player.state = PhysicsSystem::integrate(&player.state, &player.input, dt, now);
        }

        self.resolve_collisions(now);
        self.broadcast_frames();
    }

    /// Pairwise proximity check over the post-integration positions. O(n²),
    /// fine for small rooms.
    ///
    /// Every overlapping pair is evaluated. A ship that is invulnerable or
    /// still inside its collision cooldown takes nothing, but its partner
    /// does.
    fn resolve_collisions(&mut self, now: u64) {
        let ships: Vec<_> = self
            .players
            .values()
            .map(|p| {
                let exempt = p.is_invulnerable(now)
                    || now.saturating_sub(p.last_collision_at) < COLLISION_COOLDOWN_MS;
                (p.num_id, p.state.position, p.state.velocity, exempt)
            })
            .collect();

        let mut contacts = Vec::new();
        for (i, &(a, pos_a, vel_a, exempt_a)) in ships.iter().enumerate() {
            for &(b, pos_b, vel_b, exempt_b) in &ships[i + 1..] {
                if exempt_a && exempt_b {
                    continue;
                }
                if PhysicsSystem::check_ship_collision(pos_a, pos_b) {
                    let total = PhysicsSystem::collision_damage((vel_a - vel_b).length());
                    contacts.push(((a, exempt_a), (b, exempt_b), total / 2.0));
                }
            }
        }

        let mut dead: Vec<u16> = Vec::new();
        for ((a, exempt_a), (b, exempt_b), share) in contacts {
            for (id, exempt) in [(a, exempt_a), (b, exempt_b)] {
                if exempt || dead.contains(&id) {
                    continue;
                }
                if self.damage_player(id, share, now) {
                    dead.push(id);
                }
                if let Some(p) = self.players.get_mut(&id) {
                    p.last_collision_at = now;
                }
            }

            if let (Some(pa), Some(pb)) = (self.players.get(&a), self.players.get(&b)) {
                let event = ServerMsg::Collision {
                    a: pa.id.clone(),
                    b: pb.id.clone(),
                    dmg: share,
                };
                debug!(a = %pa.id, b = %pb.id, dmg = share, "Ship collision");
                self.broadcast_msg(&event, None);
            }
        }

        for num_id in dead {
            self.respawn_player(num_id, now);
        }
    }

    /// Push one binary frame to every joined connection
    fn broadcast_frames(&mut self) {
        if self.players.is_empty() {
            return;
        }

        let records: Vec<StateRecord> = self.players.values().map(StateRecord::from).collect();

        if !self.interest.is_active(records.len()) {
            let frame = Outbound::Binary(encode_frame(&records));
            let targets: Vec<ConnId> = self.players.values().map(|p| p.conn_id).collect();
            for conn_id in targets {
                self.send(conn_id, frame.clone());
            }
            return;
        }

        for viewer in &records {
            let Some(conn_id) = self.players.get(&viewer.num_id).map(|p| p.conn_id) else {
                continue;
            };
            let visible = self.interest.visible(viewer, &records);
            let frame = Outbound::Binary(encode_frame(visible));
            self.send(conn_id, frame);
        }
    }

    // ========================================================================
    // Hit resolution
    // ========================================================================

    /// Lag-compensated hitscan for one fire event
    pub fn resolve_shot(&mut self, conn_id: ConnId, request: ShootRequest, now: u64) {
        let Some(shooter) = self.joined_player_mut(conn_id) else {
            return;
        };
        shooter.last_seen = now;

        let shooter_num = shooter.num_id;
        let shooter_id = shooter.id.clone();
        let shot = Shot {
            origin: request
                .origin
                .map(|o| CombatSystem::plausible_origin(o, shooter.state.position))
                .unwrap_or(shooter.state.position),
            direction: request.direction,
            fired_at: CombatSystem::clamp_fire_time(request.fired_at, now),
            alt_mode: request.alt_mode,
        };

        let targets = self
            .players
            .values()
            .filter(|p| p.num_id != shooter_num && !p.is_invulnerable(now))
            .map(|p| Target {
                num_id: p.num_id,
                position: p.state.position,
                velocity: p.state.velocity,
                state_time: p.state.t,
            });

        let Some(hit) = CombatSystem::resolve_hitscan(&shot, targets) else {
            return;
        };

        let damage = WeaponStats::for_mode(shot.alt_mode).damage;
        let died = self.damage_player(hit.target, damage, now);

        if let Some(victim) = self.players.get(&hit.target) {
            info!(
                victim = %victim.id,
                attacker = %shooter_id,
                dmg = damage,
                alt_mode = shot.alt_mode,
                "Hit registered"
            );
            let event = ServerMsg::Hit {
                target: "player",
                id: victim.id.clone(),
                by: shooter_id,
                dmg: damage,
            };
            self.broadcast_msg(&event, None);
        }

        if died {
            self.respawn_player(hit.target, now);
        }
    }

    /// Apply damage shield-first. Returns true if the player must respawn.
    fn damage_player(&mut self, num_id: u16, damage: f32, now: u64) -> bool {
        let Some(player) = self.players.get_mut(&num_id) else {
            return false;
        };
        if player.is_invulnerable(now) {
            return false;
        }
        let outcome = CombatSystem::apply_damage(player.health, player.shield, damage);
        player.health = outcome.health;
        player.shield = outcome.shield;
        outcome.killed
    }

    /// Reset a dead player at a new spawn point and tell everyone to snap to it
    fn respawn_player(&mut self, num_id: u16, now: u64) {
        let spawn = pick_spawn(self.world_seed, self.next_spawn_index());
        let Some(player) = self.players.get_mut(&num_id) else {
            return;
        };

        player.health = MAX_HEALTH;
        player.shield = MAX_SHIELD;
        player.invulnerable_until = now + RESPAWN_INVULNERABILITY_MS;
        player.state = State::at_rest(now, spawn.position, spawn.yaw, spawn.orientation);

        info!(player_id = %player.id, "Player respawned");
        let event = ServerMsg::Respawn {
            id: player.id.clone(),
            p: spawn.position.to_array(),
            q: spawn.orientation.to_array(),
        };
        self.broadcast_msg(&event, None);
    }

    fn next_spawn_index(&mut self) -> u32 {
        let index = self.spawn_index;
        self.spawn_index = self.spawn_index.wrapping_add(1);
        index
    }

    // ========================================================================
    // Liveness & cleanup
    // ========================================================================

    /// Evict players that have been silent past the idle timeout.
    ///
    /// The evicted connection's outbound channel is dropped, which closes it.
    pub fn sweep_idle(&mut self, now: u64) -> usize {
        let stale: Vec<(u16, ConnId)> = self
            .players
            .values()
            .filter(|p| now.saturating_sub(p.last_seen) > self.idle_timeout_ms)
            .map(|p| (p.num_id, p.conn_id))
            .collect();

        for &(num_id, conn_id) in &stale {
            if let Some(peer) = self.peers.remove(&conn_id) {
                let _ = peer.tx.try_send(Outbound::Close);
            }
            self.remove_player(num_id, "idle");
        }
        stale.len()
    }

    /// Drop a player, free its numeric id, and tell everyone
    pub fn remove_player(&mut self, num_id: u16, reason: &str) {
        let Some(player) = self.players.remove(&num_id) else {
            return;
        };
        self.num_ids.release(num_id);
        if let Some(peer) = self.peers.get_mut(&player.conn_id) {
            peer.num_id = None;
        }

        info!(
            room_id = %self.id,
            player_id = %player.id,
            num_id,
            reason,
            player_count = self.players.len(),
            "Player left room"
        );
        self.broadcast_msg(&ServerMsg::PlayerRemove { id: player.id }, None);
        self.broadcast_room_stats();
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    fn joined_player_mut(&mut self, conn_id: ConnId) -> Option<&mut Player> {
        let num_id = self.peers.get(&conn_id)?.num_id?;
        self.players.get_mut(&num_id)
    }

    fn room_stats_msg(&self) -> ServerMsg {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.num_id.cmp(&b.num_id)));
        ServerMsg::RoomStats {
            players: players
                .into_iter()
                .map(|p| ScoreEntry {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    score: p.score,
                })
                .collect(),
        }
    }

    fn broadcast_room_stats(&mut self) {
        let stats = self.room_stats_msg();
        self.broadcast_msg(&stats, None);
        self.leaderboard.publish(&stats);
    }

    fn send_msg(&mut self, conn_id: ConnId, msg: &ServerMsg) {
        match Outbound::json(msg) {
            Ok(frame) => self.send(conn_id, frame),
            Err(e) => warn!(error = %e, "Failed to serialize server message"),
        }
    }

    /// Send to every joined connection except `except`
    fn broadcast_msg(&mut self, msg: &ServerMsg, except: Option<ConnId>) {
        let frame = match Outbound::json(msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to serialize server message");
                return;
            }
        };
        let targets: Vec<ConnId> = self
            .players
            .values()
            .map(|p| p.conn_id)
            .filter(|c| Some(*c) != except)
            .collect();
        for conn_id in targets {
            self.send(conn_id, frame.clone());
        }
    }

    /// Non-blocking send. A full buffer drops the frame; the tick never waits.
    fn send(&mut self, conn_id: ConnId, frame: Outbound) {
        let Some(peer) = self.peers.get(&conn_id) else {
            return;
        };
        match peer.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(conn_id = %conn_id, "Outbound buffer full, frame dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %conn_id, "Outbound channel closed");
            }
        }
    }
}
