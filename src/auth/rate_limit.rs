/// Login admission rate limiter (token bucket per key)
///
/// Buckets hold whole tokens. Refill is floor(elapsed_seconds * rate), capped
/// at capacity, and the refill anchor only advances when at least one token
/// accrued - fractional progress is never lost to repeated probing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::configuration::RateLimitSettings;

struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    capacity: u32,
    refill_per_sec: f64,
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            capacity: settings.capacity,
            refill_per_sec: settings.refill_per_sec,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Take one token for `key` if available. New keys start with a full
    /// bucket.
    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    fn admit_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap();

        let bucket = buckets.entry(key.to_string()).or_insert_with(|| TokenBucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        let refill = (elapsed * self.refill_per_sec).floor() as u32;
        if refill > 0 {
            bucket.tokens = bucket.tokens.saturating_add(refill).min(self.capacity);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(capacity: u32, refill_per_sec: f64) -> RateLimiter {
        RateLimiter::new(&RateLimitSettings {
            capacity,
            refill_per_sec,
        })
    }

    #[test]
    fn test_burst_up_to_capacity_then_deny() {
        let limiter = limiter(10, 0.2);
        let t0 = Instant::now();

        for _ in 0..10 {
            assert!(limiter.admit_at("10.0.0.1", t0));
        }
        assert!(!limiter.admit_at("10.0.0.1", t0));
    }

    #[test]
    fn test_floor_refill_after_simulated_wait() {
        let limiter = limiter(10, 0.2);
        let t0 = Instant::now();

        for _ in 0..10 {
            assert!(limiter.admit_at("10.0.0.1", t0));
        }
        assert!(!limiter.admit_at("10.0.0.1", t0));

        // 5 simulated seconds at 0.2/s accrue exactly one token
        let t1 = t0 + Duration::from_secs(5);
        assert!(limiter.admit_at("10.0.0.1", t1));
        assert!(!limiter.admit_at("10.0.0.1", t1));
    }

    #[test]
    fn test_sub_token_elapsed_keeps_anchor() {
        let limiter = limiter(10, 0.2);
        let t0 = Instant::now();

        for _ in 0..10 {
            assert!(limiter.admit_at("10.0.0.1", t0));
        }

        // 4s * 0.2 = 0.8 floors to zero; the anchor must not move,
        // otherwise the fraction would be forfeited
        let t1 = t0 + Duration::from_secs(4);
        assert!(!limiter.admit_at("10.0.0.1", t1));

        let t2 = t0 + Duration::from_secs(5);
        assert!(limiter.admit_at("10.0.0.1", t2));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let limiter = limiter(10, 0.2);
        let t0 = Instant::now();

        for _ in 0..10 {
            assert!(limiter.admit_at("10.0.0.1", t0));
        }

        // A very long wait refills to capacity, not beyond
        let t1 = t0 + Duration::from_secs(86_400);
        for _ in 0..10 {
            assert!(limiter.admit_at("10.0.0.1", t1));
        }
        assert!(!limiter.admit_at("10.0.0.1", t1));
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = limiter(1, 0.2);
        let t0 = Instant::now();

        assert!(limiter.admit_at("10.0.0.1", t0));
        assert!(!limiter.admit_at("10.0.0.1", t0));
        assert!(limiter.admit_at("10.0.0.2", t0));
    }
}
