//! Render-side smoothing of remote ships
//!
//! Remote ships are drawn slightly in the past so there is usually a pair of
//! authoritative samples to blend between. When the buffer runs dry the last
//! sample is carried forward along its velocity for a short while.

use glam::{Quat, Vec3};
use std::collections::{HashMap, VecDeque};

use crate::game::snapshot::{decode_frame, FrameError, StateRecord};

/// How far behind the newest data remote ships are rendered
pub const RENDER_DELAY_MS: u32 = 120;
/// Longest stretch a ship is extrapolated past its last sample
pub const MAX_EXTRAPOLATION_MS: u32 = 250;
/// Samples older than this (relative to the newest) are discarded
pub const RETENTION_MS: u32 = 1_000;

/// A renderable ship pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub alt_mode: bool,
}

impl From<&StateRecord> for Pose {
    fn from(r: &StateRecord) -> Self {
        Self {
            position: r.position,
            orientation: r.orientation,
            velocity: r.velocity,
            alt_mode: r.alt_mode,
        }
    }
}

/// Signed distance between two truncated millisecond stamps
fn delta_ms(from: u32, to: u32) -> i32 {
    to.wrapping_sub(from) as i32
}

/// Per-player sample history fed from binary state frames
#[derive(Debug, Default)]
pub struct SnapshotBuffer {
    history: HashMap<u16, VecDeque<StateRecord>>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame and buffer every record in it. Returns the record count.
    pub fn push_frame(&mut self, frame: &[u8]) -> Result<usize, FrameError> {
        let records = decode_frame(frame)?;
        for record in &records {
            self.push(*record);
        }
        Ok(records.len())
    }

    /// Buffer one record. Stale or duplicate stamps are ignored.
    pub fn push(&mut self, record: StateRecord) {
        let samples = self.history.entry(record.num_id).or_default();
        if let Some(last) = samples.back() {
            if delta_ms(last.timestamp, record.timestamp) <= 0 {
                return;
            }
        }
        samples.push_back(record);

        while let Some(front) = samples.front() {
            if delta_ms(front.timestamp, record.timestamp) > RETENTION_MS as i32 {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Forget a player entirely (left the room)
    pub fn remove(&mut self, num_id: u16) {
        self.history.remove(&num_id);
    }

    /// Drop history without forgetting the player, e.g. after a respawn snap
    pub fn reset(&mut self, num_id: u16) {
        if let Some(samples) = self.history.get_mut(&num_id) {
            samples.clear();
        }
    }

    pub fn len(&self, num_id: u16) -> usize {
        self.history.get(&num_id).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.history.values().all(VecDeque::is_empty)
    }

    /// Pose of `num_id` for a frame drawn at `now` (truncated server ms)
    pub fn sample(&self, num_id: u16, now: u32) -> Option<Pose> {
        let samples = self.history.get(&num_id)?;
        let render = now.wrapping_sub(RENDER_DELAY_MS);

        let first = samples.front()?;
        if delta_ms(first.timestamp, render) <= 0 {
            return Some(Pose::from(first));
        }

        for (a, b) in samples.iter().zip(samples.iter().skip(1)) {
            if delta_ms(render, b.timestamp) >= 0 {
                let span = delta_ms(a.timestamp, b.timestamp) as f32;
                let alpha = (delta_ms(a.timestamp, render) as f32 / span).clamp(0.0, 1.0);
                return Some(Pose {
                    position: a.position.lerp(b.position, alpha),
                    orientation: a.orientation.slerp(b.orientation, alpha),
                    velocity: a.velocity.lerp(b.velocity, alpha),
                    alt_mode: if alpha < 0.5 { a.alt_mode } else { b.alt_mode },
                });
            }
        }

        let last = samples.back()?;
        let ahead = delta_ms(last.timestamp, render).clamp(0, MAX_EXTRAPOLATION_MS as i32);
        let mut pose = Pose::from(last);
        pose.position += last.velocity * (ahead as f32 / 1000.0);
        Some(pose)
    }
}
