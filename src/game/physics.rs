//! Ship kinematics and proximity collisions
//!
//! These constants are mirrored by client-side prediction. Changing any of
//! them without shipping the same values to clients causes visible drift.

use glam::{Quat, Vec3};

use super::player::{Input, State};

/// Yaw turn rate (rad/s) at full axis deflection
pub const YAW_RATE: f32 = 1.8;
/// Pitch turn rate (rad/s) at full axis deflection
pub const PITCH_RATE: f32 = 1.4;
/// Pitch is held inside ±85° so the yaw/pitch basis never flips
pub const MAX_PITCH: f32 = std::f32::consts::PI * 85.0 / 180.0;
/// Visual bank angle at full roll deflection
pub const MAX_ROLL: f32 = 0.6;

/// Speed at zero throttle
pub const MIN_SPEED: f32 = 10.0;
/// Speed at full throttle with no bonuses
pub const BASE_MAX_SPEED: f32 = 60.0;
/// Max speed multiplier while the alternate weapon mode is active
pub const ALT_MODE_SPEED_BONUS: f32 = 1.25;
/// Max speed multiplier while boosting
pub const BOOST_SPEED_BONUS: f32 = 1.6;
/// Rate at which speed approaches its target (units/s²)
pub const ACCELERATION: f32 = 40.0;

/// Ship collision sphere radius
pub const SHIP_RADIUS: f32 = 8.0;
/// Positions are held inside ±WORLD_BOUND on every axis
pub const WORLD_BOUND: f32 = 5000.0;

/// Collision damage per unit of relative speed (before splitting)
pub const COLLISION_DAMAGE_FACTOR: f32 = 0.5;
pub const COLLISION_DAMAGE_MIN: f32 = 5.0;
pub const COLLISION_DAMAGE_MAX: f32 = 40.0;
/// A ship that just collided is exempt from collision damage for this long
pub const COLLISION_COOLDOWN_MS: u64 = 500;

/// Physics system for advancing ships
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Effective top speed for the given input
    pub fn max_speed(input: &Input) -> f32 {
        let mut max = BASE_MAX_SPEED;
        if input.alt_mode {
            max *= ALT_MODE_SPEED_BONUS;
        }
        if input.boost {
            max *= BOOST_SPEED_BONUS;
        }
        max
    }

    /// Target speed, linear in throttle between MIN_SPEED and the effective max
    pub fn target_speed(input: &Input) -> f32 {
        MIN_SPEED + (Self::max_speed(input) - MIN_SPEED) * input.throttle.clamp(0.0, 1.0)
    }

    /// Move `current` toward `target` by at most `rate * dt`
    pub fn approach(current: f32, target: f32, rate: f32, dt: f32) -> f32 {
        let step = rate * dt;
        if current < target {
            (current + step).min(target)
        } else {
            (current - step).max(target)
        }
    }

    /// Unit forward vector. Forward at yaw = pitch = 0 is -Z.
    pub fn forward(yaw: f32, pitch: f32) -> Vec3 {
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp)
    }

    /// Orientation as Ry(yaw) · Rx(pitch) · Rz(roll)
    pub fn orientation(yaw: f32, pitch: f32, roll: f32) -> Quat {
        Quat::from_rotation_y(yaw) * Quat::from_rotation_x(pitch) * Quat::from_rotation_z(roll)
    }

    /// Advance one ship by `dt` seconds, stamping the result with `now`
    pub fn integrate(state: &State, input: &Input, dt: f32, now: u64) -> State {
        let yaw = (state.yaw + input.yaw * YAW_RATE * dt).rem_euclid(std::f32::consts::TAU);
        let pitch = (state.pitch + input.pitch * PITCH_RATE * dt).clamp(-MAX_PITCH, MAX_PITCH);
        let roll = input.roll.clamp(-1.0, 1.0) * MAX_ROLL;

        let target = Self::target_speed(input);
        let speed = Self::approach(state.speed, target, ACCELERATION, dt);

        let forward = Self::forward(yaw, pitch);
        let velocity = forward * speed;
        let position = (state.position + velocity * dt)
            .clamp(Vec3::splat(-WORLD_BOUND), Vec3::splat(WORLD_BOUND));

        State {
            t: now,
            position,
            orientation: Self::orientation(yaw, pitch, roll),
            velocity,
            speed,
            alt_mode: input.alt_mode,
            yaw,
            pitch,
        }
    }

    /// Check if two ships' collision spheres touch
    pub fn check_ship_collision(a: Vec3, b: Vec3) -> bool {
        let reach = SHIP_RADIUS * 2.0;
        a.distance_squared(b) <= reach * reach
    }

    /// Total collision damage for a given relative speed, before splitting
    pub fn collision_damage(relative_speed: f32) -> f32 {
        (relative_speed * COLLISION_DAMAGE_FACTOR).clamp(COLLISION_DAMAGE_MIN, COLLISION_DAMAGE_MAX)
    }
}
