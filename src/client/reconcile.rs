//! Correction of the locally predicted ship toward the server's state

use glam::{Quat, Vec3};
use serde_json::Value;

use crate::util::sanitize::{to_quat, to_vec3};

use super::interpolation::Pose;

/// Fraction of the error removed per correction while drift is small
pub const BLEND_FACTOR: f32 = 0.2;
/// Errors at or beyond this distance snap straight to the server position
pub const SNAP_DISTANCE: f32 = 10.0;

/// Outcome of one reconciliation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub pose: Pose,
    pub snapped: bool,
}

/// Pull a predicted pose toward the authoritative one.
///
/// Small errors are blended out over several frames so the camera never
/// jerks; large errors (teleports, respawns, missed frames) are snapped.
pub fn reconcile(predicted: &Pose, authoritative: &Pose) -> Correction {
    let error = predicted.position.distance(authoritative.position);
    if error >= SNAP_DISTANCE {
        return Correction {
            pose: *authoritative,
            snapped: true,
        };
    }

    Correction {
        pose: Pose {
            position: predicted.position.lerp(authoritative.position, BLEND_FACTOR),
            orientation: predicted
                .orientation
                .slerp(authoritative.orientation, BLEND_FACTOR),
            velocity: predicted.velocity.lerp(authoritative.velocity, BLEND_FACTOR),
            alt_mode: authoritative.alt_mode,
        },
        snapped: false,
    }
}

/// A `respawn` event as the client applies it
#[derive(Debug, Clone, PartialEq)]
pub struct RespawnSnap {
    pub id: String,
    pub position: Vec3,
    pub orientation: Quat,
}

impl RespawnSnap {
    /// Read a decoded control message; `None` unless it is a usable respawn
    pub fn from_json(msg: &Value) -> Option<Self> {
        if msg.get("type")?.as_str()? != "respawn" {
            return None;
        }
        Some(Self {
            id: msg.get("id")?.as_str()?.to_string(),
            position: to_vec3(msg.get("p")?)?,
            orientation: to_quat(msg.get("q")?)?,
        })
    }

    /// The pose a respawned ship starts from: at rest, at the spawn point
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            orientation: self.orientation,
            velocity: Vec3::ZERO,
            alt_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pose(x: f32) -> Pose {
        Pose {
            position: Vec3::new(x, 0.0, 0.0),
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            alt_mode: false,
        }
    }

    #[test]
    fn small_errors_blend() {
        let c = reconcile(&pose(0.0), &pose(5.0));
        assert!(!c.snapped);
        assert!((c.pose.position.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn large_errors_snap() {
        let c = reconcile(&pose(0.0), &pose(10.0));
        assert!(c.snapped);
        assert_eq!(c.pose, pose(10.0));
    }

    #[test]
    fn respawn_events_parse() {
        let msg = json!({"type":"respawn","id":"abc","p":[1,2,3],"q":[0,0,0,2]});
        let snap = RespawnSnap::from_json(&msg).unwrap();
        assert_eq!(snap.id, "abc");
        assert_eq!(snap.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(snap.orientation, Quat::IDENTITY);
        assert_eq!(snap.pose().velocity, Vec3::ZERO);

        assert!(RespawnSnap::from_json(&json!({"type":"hit","id":"abc"})).is_none());
        assert!(RespawnSnap::from_json(&json!({"type":"respawn","id":"abc","p":[1]})).is_none());
    }
}
