// CLEAN (no record) -> WARNED -> BANNED -> CLEAN once the ban or window lapses

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::config::SiteConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BanKey {
    pub origin: String,
    pub credential: String,
}

impl BanKey {
    pub fn new(origin: &str, credential: &str) -> Self {
        Self {
            origin: origin.to_string(),
            credential: credential.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BanRecord {
    pub violation_count: u32,
    pub first_violation: Instant,
    pub banned_until: Option<Instant>,
    // window the record was opened under, so the sweep can age it out
    window: Duration,
}

impl BanRecord {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            violation_count: 1,
            first_violation: now,
            banned_until: None,
            window,
        }
    }

    pub fn is_banned(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }

    fn ban_lapsed(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| until <= now)
    }

    fn window_elapsed(&self, now: Instant) -> bool {
        now.duration_since(self.first_violation) >= self.window
    }

    // logically CLEAN: safe to delete
    fn is_stale(&self, now: Instant) -> bool {
        match self.banned_until {
            Some(until) => until <= now,
            None => self.window_elapsed(now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanStatus {
    Clear,
    Banned { remaining_minutes: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationOutcome {
    pub banned: bool,
    pub violation_count: u32,
}

impl ViolationOutcome {
    const UNTRACKED: Self = Self {
        banned: false,
        violation_count: 0,
    };
}

#[derive(Default)]
pub struct BanTracker {
    records: DashMap<BanKey, BanRecord>,
}

impl BanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_ban(&self, origin: &str, credential: &str, site: &SiteConfig) -> BanStatus {
        self.check_ban_at(origin, credential, site, Instant::now())
    }

    // read-only; lapsed records are left for record_violation or the sweep
    pub fn check_ban_at(
        &self,
        origin: &str,
        credential: &str,
        site: &SiteConfig,
        now: Instant,
    ) -> BanStatus {
        if site.max_violations == 0 {
            return BanStatus::Clear;
        }

        let key = BanKey::new(origin, credential);
        let Some(record) = self.records.get(&key) else {
            return BanStatus::Clear;
        };

        match record.banned_until {
            Some(until) if until > now => BanStatus::Banned {
                remaining_minutes: minutes_ceil(until - now),
            },
            _ => BanStatus::Clear,
        }
    }

    pub fn record_violation(
        &self,
        origin: &str,
        credential: &str,
        site: &SiteConfig,
    ) -> ViolationOutcome {
        self.record_violation_at(origin, credential, site, Instant::now())
    }

    pub fn record_violation_at(
        &self,
        origin: &str,
        credential: &str,
        site: &SiteConfig,
        now: Instant,
    ) -> ViolationOutcome {
        if site.max_violations == 0 {
            return ViolationOutcome::UNTRACKED;
        }

        let window = site.violation_window();
        let key = BanKey::new(origin, credential);

        // entry() holds the shard write lock for the whole update
        let mut record = self
            .records
            .entry(key)
            .and_modify(|record| {
                if record.is_banned(now) {
                    // already banned, a racing request got through the check
                    record.violation_count += 1;
                } else if record.ban_lapsed(now) || record.window_elapsed(now) {
                    *record = BanRecord::fresh(now, window);
                } else {
                    record.violation_count += 1;
                }
            })
            .or_insert_with(|| BanRecord::fresh(now, window));

        if record.banned_until.is_none() && record.violation_count >= site.max_violations {
            // an Instant that can't hold the deadline means "banned for good"
            record.banned_until = Some(
                now.checked_add(site.ban_duration())
                    .unwrap_or(now + Duration::from_secs(u32::MAX as u64)),
            );
        }

        ViolationOutcome {
            banned: record.is_banned(now),
            violation_count: record.violation_count,
        }
    }

    pub fn get(&self, origin: &str, credential: &str) -> Option<BanRecord> {
        self.records.get(&BanKey::new(origin, credential)).map(|r| *r)
    }

    pub fn purge_expired(&self) -> usize {
        let before = self.records.len();
        // fresh timestamp per record, read under the shard lock
        self.records.retain(|_, record| !record.is_stale(Instant::now()));
        before.saturating_sub(self.records.len())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_stale(now));
        before.saturating_sub(self.records.len())
    }

    pub fn active_bans(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| r.is_banned(now)).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn minutes_ceil(d: Duration) -> u64 {
    d.as_secs().div_ceil(60).max(1)
}
