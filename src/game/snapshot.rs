//! Binary state frames and interest filtering
//!
//! A frame is a bare concatenation of fixed-size big-endian records:
//!
//! | field       | type      | bytes |
//! |-------------|-----------|-------|
//! | num_id      | u16       | 2     |
//! | timestamp   | u32 (ms)  | 4     |
//! | position    | 3 × f32   | 12    |
//! | orientation | 4 × f32   | 16    |
//! | velocity    | 3 × f32   | 12    |
//! | flags       | u8        | 1     |
//!
//! Flag bit 0 is the alternate weapon mode. There is no header: the record
//! count is `len / RECORD_SIZE`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use glam::{Quat, Vec3};

use super::player::Player;

/// Size of one encoded record
pub const RECORD_SIZE: usize = 2 + 4 + 12 + 16 + 12 + 1;

const FLAG_ALT_MODE: u8 = 0b0000_0001;

/// Frame decoding errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame length {0} is not a multiple of the 47-byte record size")]
    Misaligned(usize),
}

/// One player's entry in a state frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateRecord {
    pub num_id: u16,
    /// Milliseconds, truncated to 32 bits
    pub timestamp: u32,
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub alt_mode: bool,
}

impl From<&Player> for StateRecord {
    fn from(p: &Player) -> Self {
        Self {
            num_id: p.num_id,
            timestamp: p.state.t as u32,
            position: p.state.position,
            orientation: p.state.orientation,
            velocity: p.state.velocity,
            alt_mode: p.state.alt_mode,
        }
    }
}

impl StateRecord {
    pub fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.num_id);
        buf.put_u32(self.timestamp);
        for v in self.position.to_array() {
            buf.put_f32(v);
        }
        for v in self.orientation.to_array() {
            buf.put_f32(v);
        }
        for v in self.velocity.to_array() {
            buf.put_f32(v);
        }
        buf.put_u8(if self.alt_mode { FLAG_ALT_MODE } else { 0 });
    }

    /// Read one record. `buf` must hold at least [`RECORD_SIZE`] bytes.
    fn read_from(buf: &mut impl Buf) -> Self {
        let num_id = buf.get_u16();
        let timestamp = buf.get_u32();
        let position = Vec3::new(buf.get_f32(), buf.get_f32(), buf.get_f32());
        let orientation = Quat::from_xyzw(buf.get_f32(), buf.get_f32(), buf.get_f32(), buf.get_f32());
        let velocity = Vec3::new(buf.get_f32(), buf.get_f32(), buf.get_f32());
        let flags = buf.get_u8();
        Self {
            num_id,
            timestamp,
            position,
            orientation,
            velocity,
            alt_mode: flags & FLAG_ALT_MODE != 0,
        }
    }
}

/// Encode records into one frame
pub fn encode_frame<'a, I>(records: I) -> Bytes
where
    I: IntoIterator<Item = &'a StateRecord>,
{
    let records = records.into_iter();
    let mut buf = BytesMut::with_capacity(records.size_hint().0 * RECORD_SIZE);
    for record in records {
        record.write_to(&mut buf);
    }
    buf.freeze()
}

/// Decode a frame back into records
pub fn decode_frame(mut frame: &[u8]) -> Result<Vec<StateRecord>, FrameError> {
    if frame.len() % RECORD_SIZE != 0 {
        return Err(FrameError::Misaligned(frame.len()));
    }
    let mut records = Vec::with_capacity(frame.len() / RECORD_SIZE);
    while frame.has_remaining() {
        records.push(StateRecord::read_from(&mut frame));
    }
    Ok(records)
}

/// Which players each recipient gets to see
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterestPolicy {
    /// `None` disables filtering entirely
    pub radius: Option<f32>,
    /// Filtering only kicks in at this many players
    pub min_players: usize,
}

impl Default for InterestPolicy {
    fn default() -> Self {
        Self {
            radius: None,
            min_players: 32,
        }
    }
}

impl InterestPolicy {
    /// Whether per-recipient frames are needed for a room of `player_count`
    pub fn is_active(&self, player_count: usize) -> bool {
        self.radius.is_some() && player_count >= self.min_players
    }

    /// Records visible to `viewer`. The viewer's own record is always included.
    pub fn visible<'a>(&self, viewer: &StateRecord, all: &'a [StateRecord]) -> Vec<&'a StateRecord> {
        match self.radius {
            Some(radius) if self.is_active(all.len()) => {
                let radius_sq = radius * radius;
                all.iter()
                    .filter(|r| {
                        r.num_id == viewer.num_id
                            || r.position.distance_squared(viewer.position) <= radius_sq
                    })
                    .collect()
            }
            _ => all.iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::registry::{MAX_NUM_ID, MIN_NUM_ID};

    fn record(num_id: u16, x: f32) -> StateRecord {
        StateRecord {
            num_id,
            timestamp: 0xDEAD_BEEF,
            position: Vec3::new(x, -2.5, 1e6),
            orientation: Quat::from_rotation_y(0.7),
            velocity: Vec3::new(0.1, 0.2, -0.3),
            alt_mode: num_id % 2 == 0,
        }
    }

    #[test]
    fn record_size_is_47() {
        assert_eq!(RECORD_SIZE, 47);
        let mut buf = BytesMut::new();
        record(1, 0.0).write_to(&mut buf);
        assert_eq!(buf.len(), RECORD_SIZE);
    }

    #[test]
    fn layout_is_big_endian() {
        let frame = encode_frame(&[record(0x0102, 1.0)]);
        assert_eq!(&frame[0..2], &[0x01, 0x02]);
        assert_eq!(&frame[2..6], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&frame[6..10], &1.0f32.to_be_bytes());
        assert_eq!(frame[46], 1);
    }

    #[test]
    fn frames_of_any_size_decode() {
        let full_room = (MAX_NUM_ID - MIN_NUM_ID) as usize + 1;
        for count in [0usize, 1, 2, 17, 300, full_room] {
            let records: Vec<StateRecord> = (0..count).map(|i| record(i as u16 + 1, i as f32)).collect();
            let frame = encode_frame(&records);
            assert_eq!(frame.len(), count * RECORD_SIZE);
            assert_eq!(decode_frame(&frame).unwrap(), records);
        }
    }

    #[test]
    fn full_room_frame_keeps_the_last_id() {
        let records: Vec<StateRecord> = (MIN_NUM_ID..=MAX_NUM_ID).map(|id| record(id, 0.0)).collect();
        let decoded = decode_frame(&encode_frame(&records)).unwrap();
        assert_eq!(decoded.last().map(|r| r.num_id), Some(MAX_NUM_ID));
    }

    #[test]
    fn misaligned_frames_are_rejected() {
        let frame = encode_frame(&[record(1, 0.0)]);
        assert_eq!(decode_frame(&frame[..46]), Err(FrameError::Misaligned(46)));
    }

    #[test]
    fn interest_filter_defaults_to_everyone() {
        let all: Vec<StateRecord> = (1..=40).map(|i| record(i, i as f32 * 1000.0)).collect();
        let policy = InterestPolicy::default();
        assert_eq!(policy.visible(&all[0], &all).len(), 40);
    }

    #[test]
    fn interest_filter_keeps_self_and_neighbours() {
        let all: Vec<StateRecord> = (1..=4).map(|i| record(i, i as f32 * 100.0)).collect();
        let policy = InterestPolicy {
            radius: Some(150.0),
            min_players: 2,
        };
        let seen: Vec<u16> = policy.visible(&all[0], &all).iter().map(|r| r.num_id).collect();
        assert_eq!(seen, vec![1, 2]);

        let below_threshold = InterestPolicy {
            min_players: 10,
            ..policy
        };
        assert_eq!(below_threshold.visible(&all[0], &all).len(), 4);
    }
}
