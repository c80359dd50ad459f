use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Member, Page, Pagination};

/// A cached page of roster records.
///
/// Entries are immutable once built. A refresh produces a new entry that
/// replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    page: Page,
    fetched_at: DateTime<Utc>,
    /// Set by explicit invalidation; an expired entry reads as stale
    /// regardless of its age.
    expired: bool,
}

impl CacheEntry {
    /// Build an entry from a fetched page. Returns `None` when the page holds
    /// more records than its page size allows.
    pub fn new(page: Page, fetched_at: DateTime<Utc>) -> Option<Self> {
        if page.records.len() > page.pagination.page_size as usize {
            return None;
        }
        Some(Self {
            page,
            fetched_at,
            expired: false,
        })
    }

    pub fn records(&self) -> &[Member] {
        &self.page.records
    }

    pub fn pagination(&self) -> &Pagination {
        &self.page.pagination
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Copy of this entry marked expired.
    pub fn expire(&self) -> Self {
        Self {
            expired: true,
            ..self.clone()
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expired || now - self.fetched_at > threshold
    }
}

/// Read-only view of a cache entry as of one read.
#[derive(Debug, Clone)]
pub struct CachedPage {
    entry: Arc<CacheEntry>,
    is_stale: bool,
}

impl CachedPage {
    pub fn new(entry: Arc<CacheEntry>, is_stale: bool) -> Self {
        Self { entry, is_stale }
    }

    pub fn records(&self) -> &[Member] {
        self.entry.records()
    }

    pub fn pagination(&self) -> &Pagination {
        self.entry.pagination()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.entry.fetched_at()
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn entry(&self) -> &Arc<CacheEntry> {
        &self.entry
    }
}
