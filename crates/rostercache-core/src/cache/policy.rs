use chrono::{DateTime, Duration, Utc};

use super::CacheEntry;

/// Default window during which a fetched page counts as fresh.
/// Long enough to absorb paging back and forth without refetching.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 30;

/// How a read should be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Nothing cached; the caller has to wait for a fetch.
    Miss,
    /// Cached and fresh; no network call.
    Hit,
    /// Cached but stale; serve it now and refresh in the background.
    StaleHit,
}

impl Freshness {
    pub fn has_data(self) -> bool {
        !matches!(self, Freshness::Miss)
    }

    pub fn needs_fetch(self) -> bool {
        !matches!(self, Freshness::Hit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevalidationPolicy {
    stale_after: Duration,
}

impl RevalidationPolicy {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn classify(&self, entry: Option<&CacheEntry>, now: DateTime<Utc>) -> Freshness {
        match entry {
            None => Freshness::Miss,
            Some(e) if e.is_stale(now, self.stale_after) => Freshness::StaleHit,
            Some(_) => Freshness::Hit,
        }
    }
}

impl Default for RevalidationPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_STALE_AFTER_SECS))
    }
}
