use crate::ban::{BanStatus, BanTracker, ViolationOutcome};
use crate::config::SiteConfig;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub rate_windows: usize,
    pub ban_records: usize,
}

// Owns both maps; nothing else touches them.
#[derive(Default)]
pub struct AccessStore {
    rate_limiter: RateLimiter,
    bans: BanTracker,
}

impl AccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    // one shared budget per origin, not per caller
    pub fn try_admit(&self, origin: &str, site: &SiteConfig) -> bool {
        self.rate_limiter.try_admit(origin, site.rate_limit)
    }

    pub fn check_ban(&self, origin: &str, credential: &str, site: &SiteConfig) -> BanStatus {
        self.bans.check_ban(origin, credential, site)
    }

    pub fn record_violation(
        &self,
        origin: &str,
        credential: &str,
        site: &SiteConfig,
    ) -> ViolationOutcome {
        self.bans.record_violation(origin, credential, site)
    }

    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            rate_windows: self.rate_limiter.purge_expired(),
            ban_records: self.bans.purge_expired(),
        }
    }

    pub fn active_bans(&self) -> usize {
        self.bans.active_bans()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn bans(&self) -> &BanTracker {
        &self.bans
    }
}
