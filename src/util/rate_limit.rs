//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Max inbound room messages per connection in any rolling second
pub const INPUT_RATE_LIMIT: u32 = 30;

/// Width of the rolling window used by [`InputRateLimiter`]
pub const INPUT_RATE_WINDOW: Duration = Duration::from_secs(1);

/// Per-connection limiter over a rolling window.
///
/// Unlike a token bucket, this never admits more than `limit` messages inside
/// any window of `window` length, regardless of how they are spaced.
#[derive(Debug)]
pub struct InputRateLimiter {
    limit: usize,
    window: Duration,
    accepted: VecDeque<Instant>,
}

impl InputRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1) as usize,
            window,
            accepted: VecDeque::with_capacity(limit as usize),
        }
    }

    /// Check if a message is allowed now (returns true if allowed)
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    /// Like [`Self::check`] but with an explicit clock reading.
    pub fn check_at(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.accepted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.accepted.pop_front();
            } else {
                break;
            }
        }

        if self.accepted.len() >= self.limit {
            return false;
        }
        self.accepted.push_back(now);
        true
    }
}

impl Default for InputRateLimiter {
    fn default() -> Self {
        Self::new(INPUT_RATE_LIMIT, INPUT_RATE_WINDOW)
    }
}

/// Keyed limiter type alias
pub type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Admission control for new connections, keyed by peer IP
#[derive(Clone)]
pub struct ConnectionLimiter {
    limiter: Arc<KeyedLimiter>,
}

impl ConnectionLimiter {
    /// Create a limiter admitting `per_second` connection attempts per IP
    pub fn new(per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Check if a connection attempt from `ip` is allowed
    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Drop state for IPs whose quota has fully replenished
    pub fn prune(&self) {
        self.limiter.retain_recent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_one_in_one_second_admits_thirty() {
        let mut limiter = InputRateLimiter::default();
        let start = Instant::now();

        let accepted = (0..31)
            .filter(|i| limiter.check_at(start + Duration::from_millis(i * 30)))
            .count();

        assert_eq!(accepted, 30);
    }

    #[test]
    fn window_rolls_forward() {
        let mut limiter = InputRateLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();

        assert!(limiter.check_at(start));
        assert!(limiter.check_at(start + Duration::from_millis(400)));
        assert!(limiter.check_at(start + Duration::from_millis(800)));
        assert!(!limiter.check_at(start + Duration::from_millis(900)));

        // The first message leaves the window at exactly one second.
        assert!(limiter.check_at(start + Duration::from_millis(1000)));
        assert!(!limiter.check_at(start + Duration::from_millis(1100)));
        assert!(limiter.check_at(start + Duration::from_millis(1400)));
    }

    #[test]
    fn rejected_messages_do_not_consume_quota() {
        let mut limiter = InputRateLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        assert!(limiter.check_at(start));
        assert!(limiter.check_at(start));
        for i in 1..50 {
            assert!(!limiter.check_at(start + Duration::from_millis(i * 10)));
        }
        assert!(limiter.check_at(start + Duration::from_millis(1000)));
    }

    #[test]
    fn connection_limiter_is_per_ip() {
        let limiter = ConnectionLimiter::new(2);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }
}
