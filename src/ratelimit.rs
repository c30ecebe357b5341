//! Sliding-window rate limiter (spec §5/§6): one default window for most
//! routes, a stricter one for `/api/search/voice`. Grounded in the
//! teacher's `RateLimiter` (`security/rate_limiter.rs`) but simplified to
//! the window/limit semantics the spec actually calls for — no strike
//! escalation or permanent bans, just "allowed or not, with a retry-after".

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

struct KeyState {
    timestamps: Vec<Instant>,
    last_seen: Instant,
}

/// One sliding window per `{channel}:{identity}` key (spec §6's rate
/// limiting is keyed by client, not globally).
pub struct SlidingWindowRateLimiter {
    limit: u32,
    window: Duration,
    states: Mutex<HashMap<String, KeyState>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(max_requests: u32, window_ms: u64) -> Self {
        Self::new(max_requests, Duration::from_millis(window_ms))
    }

    pub fn check(&self, key: &str) -> RateLimitResult {
        let now = Instant::now();
        let mut states = self.states.lock();
        let state = states.entry(key.to_string()).or_insert_with(|| KeyState {
            timestamps: Vec::new(),
            last_seen: now,
        });
        state.last_seen = now;

        let window_start = now.checked_sub(self.window).unwrap_or(now);
        state.timestamps.retain(|&ts| ts >= window_start);

        if state.timestamps.len() as u32 >= self.limit {
            let oldest = state.timestamps.first().copied().unwrap_or(now);
            let retry_after = (oldest + self.window).saturating_duration_since(now);
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                retry_after_secs: retry_after.as_secs().max(1),
            };
        }

        state.timestamps.push(now);
        let remaining = self.limit - state.timestamps.len() as u32;
        RateLimitResult {
            allowed: true,
            remaining,
            retry_after_secs: 0,
        }
    }

    /// Drops keys untouched for longer than `max_idle`, bounding memory for
    /// a long-lived process (spec §5's ambient resource-hygiene note).
    pub fn cleanup_stale(&self, max_idle: Duration) {
        let now = Instant::now();
        let mut states = self.states.lock();
        states.retain(|_, state| now.saturating_duration_since(state.last_seen) < max_idle);
    }

    pub fn tracked_keys(&self) -> usize {
        self.states.lock().len()
    }
}
