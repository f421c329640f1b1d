//! Spawn placement and world seed derivation
//!
//! Everything here is a pure function of its arguments so that clients can
//! regenerate the same static layout from the seed in the welcome message.

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use super::physics::PhysicsSystem;

/// Radius of the objective area around the world origin
pub const OBJECTIVE_RADIUS: f32 = 150.0;
/// Minimum flight time from a spawn point to the objective
pub const MIN_TRAVEL_SECS: f32 = 20.0;
/// Speed used to convert travel time into distance
pub const CRUISE_SPEED: f32 = 35.0;
/// Inner edge of the spawn ring
pub const SPAWN_RING_MIN: f32 = OBJECTIVE_RADIUS + MIN_TRAVEL_SECS * CRUISE_SPEED;
/// Radial thickness of the spawn ring
pub const SPAWN_RING_WIDTH: f32 = 150.0;
/// Spawn altitude is drawn from ±this
pub const SPAWN_ALTITUDE: f32 = 40.0;

/// A spawn point with a heading toward the objective
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spawn {
    pub position: Vec3,
    pub yaw: f32,
    pub orientation: Quat,
}

/// Place the `index`-th spawn of a room seeded with `seed`.
pub fn pick_spawn(seed: u32, index: u32) -> Spawn {
    let mut rng = ChaCha8Rng::seed_from_u64(((seed as u64) << 32) | index as u64);

    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let radius = rng.gen_range(SPAWN_RING_MIN..SPAWN_RING_MIN + SPAWN_RING_WIDTH);
    let altitude = rng.gen_range(-SPAWN_ALTITUDE..=SPAWN_ALTITUDE);

    let (sin, cos) = angle.sin_cos();
    let position = Vec3::new(cos * radius, altitude, sin * radius);

    // Face the objective: forward(yaw, 0) must point at -position.
    let yaw = position.x.atan2(position.z).rem_euclid(std::f32::consts::TAU);

    Spawn {
        position,
        yaw,
        orientation: PhysicsSystem::orientation(yaw, 0.0, 0.0),
    }
}

/// Fresh world seed for a new room
pub fn random_seed() -> u32 {
    rand::random()
}

/// Short digest of the seed so clients can detect world-generation drift
pub fn world_checksum(seed: u32) -> String {
    let digest = Sha256::digest(seed.to_be_bytes());
    hex::encode(&digest[..4])
}

/// Deterministic display colour for a numeric id, as `#rrggbb`
pub fn player_color(num_id: u16) -> String {
    let hue = (num_id as f32 * 137.508) % 360.0;
    let [r, g, b] = hsv_to_rgb(hue, 0.65, 0.95);
    format!("#{}", hex::encode([r, g, b]))
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let c = value * saturation;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_byte(r), to_byte(g), to_byte(b)]
}
