use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const RATE_WINDOW: Duration = Duration::from_secs(60);

// Rate limit entry - tracks admitted requests per upstream origin
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_expiry: Instant,
}

impl RateLimitEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_expiry
    }
}

// One fixed window per origin. Updates run under the key's shard lock.
#[derive(Default)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_admit(&self, origin: &str, limit: u32) -> bool {
        self.try_admit_at(origin, limit, Instant::now())
    }

    pub fn try_admit_at(&self, origin: &str, limit: u32, now: Instant) -> bool {
        // 0 = unlimited
        if limit == 0 {
            return true;
        }

        // fast path for an exhausted window: a rejection never writes
        if let Some(entry) = self.entries.get(origin) {
            if !entry.is_expired(now) && entry.count >= limit {
                return false;
            }
        }

        let mut entry = self
            .entries
            .entry(origin.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_expiry: now + RATE_WINDOW,
            });

        // window expired..? start a new one
        if entry.is_expired(now) {
            entry.count = 1;
            entry.window_expiry = now + RATE_WINDOW;
            return true;
        }

        // under limit? allow
        if entry.count < limit {
            entry.count += 1;
            return true;
        }

        false
    }

    pub fn current(&self, origin: &str) -> Option<RateLimitEntry> {
        self.entries.get(origin).map(|e| *e)
    }

    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        // timestamp is read inside retain, under the shard lock
        self.entries.retain(|_, entry| !entry.is_expired(Instant::now()));
        before.saturating_sub(self.entries.len())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
