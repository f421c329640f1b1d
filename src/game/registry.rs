//! Identity allocation for players

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::collections::HashSet;

/// Lowest numeric id handed out
pub const MIN_NUM_ID: u16 = 1;
/// Highest numeric id handed out (0 and 65535 are never used)
pub const MAX_NUM_ID: u16 = 65534;

/// Generate an opaque, unguessable player id (8 URL-safe characters)
pub fn new_player_id() -> String {
    let bytes: [u8; 6] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Pool of compact numeric ids.
///
/// Allocation walks forward from the last id handed out and wraps at
/// [`MAX_NUM_ID`], so a freed id is reused only after the cursor comes back
/// around to it.
#[derive(Debug)]
pub struct NumIdPool {
    next: u16,
    in_use: HashSet<u16>,
}

impl NumIdPool {
    pub fn new() -> Self {
        Self {
            next: MIN_NUM_ID,
            in_use: HashSet::new(),
        }
    }

    /// Take the next free id, or `None` if every id is in use
    pub fn allocate(&mut self) -> Option<u16> {
        let capacity = (MAX_NUM_ID - MIN_NUM_ID) as usize + 1;
        if self.in_use.len() >= capacity {
            return None;
        }

        loop {
            let candidate = self.next;
            self.next = if candidate >= MAX_NUM_ID {
                MIN_NUM_ID
            } else {
                candidate + 1
            };
            if self.in_use.insert(candidate) {
                return Some(candidate);
            }
        }
    }

    /// Return an id to the pool
    pub fn release(&mut self, id: u16) {
        self.in_use.remove(&id);
    }
}

impl Default for NumIdPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially_from_one() {
        let mut pool = NumIdPool::new();
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), Some(3));
    }

    #[test]
    fn wraps_and_reuses_freed_ids() {
        let mut pool = NumIdPool::new();
        for expected in MIN_NUM_ID..=MAX_NUM_ID {
            assert_eq!(pool.allocate(), Some(expected));
        }
        assert_eq!(pool.allocate(), None);

        pool.release(17);
        pool.release(4);
        assert_eq!(pool.allocate(), Some(4));
        assert_eq!(pool.allocate(), Some(17));
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn player_ids_are_short_and_distinct() {
        let a = new_player_id();
        let b = new_player_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
