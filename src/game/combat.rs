//! Combat system - damage absorption and lag-compensated hitscan

use glam::Vec3;

use crate::util::time::millis_delta_secs;

use super::physics::SHIP_RADIUS;

pub const MAX_HEALTH: f32 = 100.0;
pub const MAX_SHIELD: f32 = 100.0;

/// Invulnerability granted after a respawn
pub const RESPAWN_INVULNERABILITY_MS: u64 = 2_000;

/// How far back a fire timestamp may reach
pub const MAX_REWIND_MS: u64 = 300;

/// Max distance between a claimed muzzle origin and the shooter's ship
pub const MAX_ORIGIN_DRIFT: f32 = 60.0;

/// Weapon stats per weapon mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: f32,
    /// Maximum ray length
    pub range: f32,
}

impl WeaponStats {
    pub const PRIMARY: WeaponStats = WeaponStats {
        damage: 12.0,
        range: 600.0,
    };

    pub const ALT: WeaponStats = WeaponStats {
        damage: 35.0,
        range: 1200.0,
    };

    pub fn for_mode(alt_mode: bool) -> Self {
        if alt_mode {
            Self::ALT
        } else {
            Self::PRIMARY
        }
    }
}

/// Outcome of applying damage to a shield/health pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Absorption {
    pub shield: f32,
    pub health: f32,
    /// Amount actually removed (shield + health)
    pub dealt: f32,
    pub killed: bool,
}

/// A fire event after sanitization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
    /// Server-clock time (ms) the shot was fired at
    pub fired_at: u64,
    pub alt_mode: bool,
}

/// Last known kinematics of a potential victim
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub num_id: u16,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Stamp (ms) of the state `position` belongs to
    pub state_time: u64,
}

/// A confirmed hitscan hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub target: u16,
    /// Distance along the ray to the closest approach
    pub ray_t: f32,
}

/// Combat system for damage and hit detection
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage, draining shield first then health.
    ///
    /// Both pools stay in `[0, max]`; negative or non-finite damage is ignored.
    pub fn apply_damage(health: f32, shield: f32, damage: f32) -> Absorption {
        let damage = if damage.is_finite() { damage.max(0.0) } else { 0.0 };
        let health = health.clamp(0.0, MAX_HEALTH);
        let shield = shield.clamp(0.0, MAX_SHIELD);

        let from_shield = damage.min(shield);
        let from_health = (damage - from_shield).min(health);
        let new_health = health - from_health;

        Absorption {
            shield: shield - from_shield,
            health: new_health,
            dealt: from_shield + from_health,
            killed: new_health <= 0.0,
        }
    }

    /// Position of `target` at `at_ms`, extrapolated along its last velocity
    pub fn extrapolate(target: &Target, at_ms: u64) -> Vec3 {
        let dt = millis_delta_secs(target.state_time, at_ms);
        target.position + target.velocity * dt
    }

    /// Clamp a client fire stamp into the allowed rewind window
    pub fn clamp_fire_time(claimed: Option<u64>, now: u64) -> u64 {
        match claimed {
            Some(t) => t.clamp(now.saturating_sub(MAX_REWIND_MS), now),
            None => now,
        }
    }

    /// Replace a muzzle origin that is implausibly far from the shooter
    pub fn plausible_origin(claimed: Vec3, shooter_position: Vec3) -> Vec3 {
        if claimed.distance_squared(shooter_position) > MAX_ORIGIN_DRIFT * MAX_ORIGIN_DRIFT {
            shooter_position
        } else {
            claimed
        }
    }

    /// Test one shot against every target, rewound to the fire time.
    ///
    /// The candidate closest along the ray wins; equal distances fall back to
    /// the lower numeric id so the outcome never depends on iteration order.
    pub fn resolve_hitscan<I>(shot: &Shot, targets: I) -> Option<HitResult>
    where
        I: IntoIterator<Item = Target>,
    {
        let range = WeaponStats::for_mode(shot.alt_mode).range;
        let radius_sq = SHIP_RADIUS * SHIP_RADIUS;

        let mut best: Option<HitResult> = None;
        for target in targets {
            let rewound = Self::extrapolate(&target, shot.fired_at);
            let ray_t = (rewound - shot.origin).dot(shot.direction).clamp(0.0, range);
            let closest = shot.origin + shot.direction * ray_t;
            if closest.distance_squared(rewound) > radius_sq {
                continue;
            }

            let better = match best {
                None => true,
                Some(b) => ray_t < b.ray_t || (ray_t == b.ray_t && target.num_id < b.target),
            };
            if better {
                best = Some(HitResult {
                    target: target.num_id,
                    ray_t,
                });
            }
        }
        best
    }
}
