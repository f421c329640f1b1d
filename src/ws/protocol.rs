//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use bytes::Bytes;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::game::physics::WORLD_BOUND;
use crate::game::player::{Input, Player, State};
use crate::util::sanitize::{
    clamp, clamp_vec3, sanitize_name, to_finite_f64, to_finite_number, to_timestamp, to_vec3,
    truthy,
};

/// Upper bound for the advisory score
pub const MAX_SCORE: f64 = 1e9;

/// Errors decoding a client control message
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Not JSON, missing/unknown `type`, or wrong shape
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("shot direction is missing or zero")]
    DegenerateDirection,
}

/// Messages as they arrive, before any coercion
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum RawClientMsg {
    Hello {
        #[serde(default)]
        name: Value,
    },
    Input {
        #[serde(default)]
        t: Value,
        #[serde(default)]
        throttle: Value,
        #[serde(default)]
        yaw: Value,
        #[serde(default)]
        pitch: Value,
        #[serde(default)]
        roll: Value,
        #[serde(default)]
        boost: Value,
        #[serde(default)]
        fire: Value,
        #[serde(default, rename = "altMode")]
        alt_mode: Value,
    },
    Shoot {
        #[serde(default)]
        t: Value,
        #[serde(default)]
        p: Value,
        #[serde(default)]
        dir: Value,
        #[serde(default, rename = "altMode")]
        alt_mode: Value,
    },
    Ping {
        #[serde(default)]
        t: Value,
    },
    Score {
        #[serde(default)]
        score: Value,
    },
}

/// A fire request, sanitized but not yet checked against the shooter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShootRequest {
    /// Client-claimed fire time (ms), bounded by the room
    pub fired_at: Option<u64>,
    /// Claimed muzzle position, if one was sent
    pub origin: Option<Vec3>,
    /// Unit direction
    pub direction: Vec3,
    pub alt_mode: bool,
}

/// Messages sent from client to server, after sanitization
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    /// Handshake with a display name
    Hello { name: String },
    /// Control state
    Input(Input),
    /// Fire event
    Shoot(ShootRequest),
    /// Heartbeat and clock sync
    Ping { t: f64 },
    /// Advisory score report
    Score { score: f64 },
}

impl ClientMsg {
    /// Decode a text frame. Numeric fields never fail; only the shape can.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawClientMsg = serde_json::from_str(text)?;
        Ok(match raw {
            RawClientMsg::Hello { name } => ClientMsg::Hello {
                name: sanitize_name(&name),
            },
            RawClientMsg::Input {
                t,
                throttle,
                yaw,
                pitch,
                roll,
                boost,
                fire,
                alt_mode,
            } => ClientMsg::Input(Input {
                t: to_timestamp(&t).unwrap_or(0),
                throttle: clamp(to_finite_number(&throttle), 0.0, 1.0),
                yaw: clamp(to_finite_number(&yaw), -1.0, 1.0),
                pitch: clamp(to_finite_number(&pitch), -1.0, 1.0),
                roll: clamp(to_finite_number(&roll), -1.0, 1.0),
                boost: truthy(&boost),
                fire: truthy(&fire),
                alt_mode: truthy(&alt_mode),
            }),
            RawClientMsg::Shoot { t, p, dir, alt_mode } => {
                let direction = to_vec3(&dir)
                    .map(Vec3::normalize_or_zero)
                    .filter(|d| *d != Vec3::ZERO)
                    .ok_or(ProtocolError::DegenerateDirection)?;
                ClientMsg::Shoot(ShootRequest {
                    fired_at: to_timestamp(&t),
                    origin: to_vec3(&p).map(|o| clamp_vec3(o, WORLD_BOUND)),
                    direction,
                    alt_mode: truthy(&alt_mode),
                })
            }
            RawClientMsg::Ping { t } => ClientMsg::Ping {
                t: to_finite_f64(&t).unwrap_or(0.0),
            },
            RawClientMsg::Score { score } => ClientMsg::Score {
                score: to_finite_f64(&score).unwrap_or(0.0).clamp(0.0, MAX_SCORE),
            },
        })
    }
}

/// Observable state as sent in control messages
#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub t: u64,
    pub p: [f32; 3],
    pub q: [f32; 4],
    pub v: [f32; 3],
    pub speed: f32,
    #[serde(rename = "altMode")]
    pub alt_mode: bool,
}

impl From<&State> for StateView {
    fn from(s: &State) -> Self {
        Self {
            t: s.t,
            p: s.position.to_array(),
            q: s.orientation.to_array(),
            v: s.velocity.to_array(),
            speed: s.speed,
            alt_mode: s.alt_mode,
        }
    }
}

/// Player identity plus current state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: String,
    pub num_id: u16,
    pub name: String,
    pub color: String,
    pub state: StateView,
}

impl From<&Player> for PlayerInfo {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            num_id: p.num_id,
            name: p.name.clone(),
            color: p.color.clone(),
            state: StateView::from(&p.state),
        }
    }
}

/// Scoreboard row
#[derive(Debug, Clone, Serialize)]
pub struct ScoreEntry {
    pub id: String,
    pub name: String,
    pub score: f64,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMsg {
    /// Handshake reply
    #[serde(rename_all = "camelCase")]
    Welcome {
        player_id: String,
        room_id: String,
        world_seed: u32,
        world_checksum: String,
        players: Vec<PlayerInfo>,
    },

    /// A player joined the room
    PlayerAdd(PlayerInfo),

    /// A player left or was evicted
    PlayerRemove { id: String },

    /// Hitscan hit. `target` names the kind of thing that was hit.
    Hit {
        target: &'static str,
        id: String,
        by: String,
        dmg: f32,
    },

    /// Two ships collided; `dmg` is what each of them took
    Collision { a: String, b: String, dmg: f32 },

    /// Snap the avatar to a fresh spawn
    Respawn { id: String, p: [f32; 3], q: [f32; 4] },

    /// Clock sync reply
    #[serde(rename_all = "camelCase")]
    Pong { t_server: u64, t_client: f64 },

    /// Scoreboard refresh
    RoomStats { players: Vec<ScoreEntry> },
}

/// Frame queued for a single connection writer
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(Arc<str>),
    Binary(Bytes),
    Close,
}

impl Outbound {
    /// Serialize a server message once so it can be fanned out cheaply
    pub fn json(msg: &ServerMsg) -> Result<Self, serde_json::Error> {
        Ok(Outbound::Text(serde_json::to_string(msg)?.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_is_clamped_and_coerced() {
        let msg = ClientMsg::parse(
            r#"{"type":"input","t":1000,"throttle":7,"yaw":-3,"pitch":"0.5","roll":null,"boost":1,"fire":"","altMode":true}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMsg::Input(Input {
                t: 1000,
                throttle: 1.0,
                yaw: -1.0,
                pitch: 0.5,
                roll: 0.0,
                boost: true,
                fire: false,
                alt_mode: true,
            })
        );
    }

    #[test]
    fn missing_fields_default() {
        let msg = ClientMsg::parse(r#"{"type":"input"}"#).unwrap();
        assert_eq!(msg, ClientMsg::Input(Input::default()));

        let hello = ClientMsg::parse(r#"{"type":"hello"}"#).unwrap();
        assert_eq!(
            hello,
            ClientMsg::Hello {
                name: "Pilot".to_string()
            }
        );
    }

    #[test]
    fn unknown_or_untyped_messages_fail() {
        assert!(ClientMsg::parse(r#"{"type":"teleport","p":[0,0,0]}"#).is_err());
        assert!(ClientMsg::parse(r#"{"throttle":1}"#).is_err());
        assert!(ClientMsg::parse("not json").is_err());
    }

    #[test]
    fn shoot_normalizes_direction() {
        let msg = ClientMsg::parse(r#"{"type":"shoot","t":5,"p":[1,2,3],"dir":[0,0,-10],"altMode":1}"#).unwrap();
        match msg {
            ClientMsg::Shoot(shot) => {
                assert_eq!(shot.direction, Vec3::NEG_Z);
                assert_eq!(shot.origin, Some(Vec3::new(1.0, 2.0, 3.0)));
                assert_eq!(shot.fired_at, Some(5));
                assert!(shot.alt_mode);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            ClientMsg::parse(r#"{"type":"shoot","dir":[0,0,0]}"#),
            Err(ProtocolError::DegenerateDirection)
        ));
        assert!(matches!(
            ClientMsg::parse(r#"{"type":"shoot"}"#),
            Err(ProtocolError::DegenerateDirection)
        ));
    }

    #[test]
    fn score_is_bounded() {
        assert_eq!(
            ClientMsg::parse(r#"{"type":"score","score":-4}"#).unwrap(),
            ClientMsg::Score { score: 0.0 }
        );
        assert_eq!(
            ClientMsg::parse(r#"{"type":"score","score":1e20}"#).unwrap(),
            ClientMsg::Score { score: MAX_SCORE }
        );
    }

    #[test]
    fn server_messages_use_wire_names() {
        let hit = ServerMsg::Hit {
            target: "player",
            id: "b".into(),
            by: "a".into(),
            dmg: 35.0,
        };
        assert_eq!(
            serde_json::to_value(&hit).unwrap(),
            json!({"type":"hit","target":"player","id":"b","by":"a","dmg":35.0})
        );

        let pong = ServerMsg::Pong {
            t_server: 10,
            t_client: 4.0,
        };
        assert_eq!(
            serde_json::to_value(&pong).unwrap(),
            json!({"type":"pong","tServer":10,"tClient":4.0})
        );

        let stats = ServerMsg::RoomStats { players: vec![] };
        assert_eq!(serde_json::to_value(&stats).unwrap()["type"], "room-stats");

        let remove = ServerMsg::PlayerRemove { id: "x".into() };
        assert_eq!(
            serde_json::to_value(&remove).unwrap(),
            json!({"type":"player-remove","id":"x"})
        );
    }
}
