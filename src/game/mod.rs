//! Game simulation modules

pub mod combat;
pub mod physics;
pub mod player;
pub mod registry;
pub mod room;
pub mod service;
pub mod snapshot;
pub mod spawn;

pub use player::{ConnId, Input, Player, State};
pub use room::{Room, RoomSettings, RoomStats};
pub use service::{RoomCommand, RoomHandle, RoomService, Schedules};
