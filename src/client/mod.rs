//! Reference client-side smoothing
//!
//! Not used by the server. It shows how a receiver consumes state frames and
//! respawn events, and lets those paths be tested against the server codec.

pub mod interpolation;
pub mod reconcile;

pub use interpolation::{Pose, SnapshotBuffer};
pub use reconcile::{reconcile, Correction, RespawnSnap};
