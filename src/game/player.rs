//! Player record and its input/state halves

use glam::{Quat, Vec3};
use uuid::Uuid;

use super::combat::{MAX_HEALTH, MAX_SHIELD};

/// Connection identity. A player lives and dies with its connection.
pub type ConnId = Uuid;

/// Last-known control intent (already sanitized)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Input {
    /// Client timestamp (ms), advisory only
    pub t: u64,
    /// Throttle in [0, 1]
    pub throttle: f32,
    /// Yaw axis in [-1, 1]
    pub yaw: f32,
    /// Pitch axis in [-1, 1]
    pub pitch: f32,
    /// Roll axis in [-1, 1]
    pub roll: f32,
    pub boost: bool,
    pub fire: bool,
    pub alt_mode: bool,
}

/// Simulated state, produced only by the tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State {
    /// Wall-clock stamp of the tick that produced this state (ms)
    pub t: u64,
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub speed: f32,
    pub alt_mode: bool,
    /// Heading angle in radians, integrated from the yaw axis
    pub yaw: f32,
    /// Elevation angle in radians, integrated from the pitch axis
    pub pitch: f32,
}

impl State {
    /// A resting state at a spawn point
    pub fn at_rest(t: u64, position: Vec3, yaw: f32, orientation: Quat) -> Self {
        Self {
            t,
            position,
            orientation,
            velocity: Vec3::ZERO,
            speed: 0.0,
            alt_mode: false,
            yaw,
            pitch: 0.0,
        }
    }
}

/// Authoritative player record (owned by the room)
#[derive(Debug, Clone)]
pub struct Player {
    /// Opaque, unguessable id exposed in control messages
    pub id: String,
    /// Compact id used in binary frames
    pub num_id: u16,
    pub conn_id: ConnId,
    pub name: String,
    pub color: String,

    // Combat
    pub health: f32,
    pub shield: f32,
    pub invulnerable_until: u64,
    pub last_collision_at: u64,

    // Liveness
    pub last_seen: u64,

    /// Client-reported, never trusted for gameplay
    pub score: f64,

    pub input: Input,
    pub state: State,
}

impl Player {
    pub fn new(
        id: String,
        num_id: u16,
        conn_id: ConnId,
        name: String,
        color: String,
        state: State,
        now: u64,
    ) -> Self {
        Self {
            id,
            num_id,
            conn_id,
            name,
            color,
            health: MAX_HEALTH,
            shield: MAX_SHIELD,
            invulnerable_until: 0,
            last_collision_at: 0,
            last_seen: now,
            score: 0.0,
            input: Input::default(),
            state,
        }
    }

    pub fn is_invulnerable(&self, now: u64) -> bool {
        now < self.invulnerable_until
    }
}
