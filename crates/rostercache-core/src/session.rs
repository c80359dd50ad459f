//! Session-wide roster cache.
//!
//! One `RosterCache` lives for one signed-in session. It owns the page store,
//! the request coordinator and the fetcher, and hands out a
//! `QueryController` per view. Call `reset` on logout.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cache::{
    CacheEntry, CacheKey, CacheStore, CachedPage, Freshness, QueryKey, RevalidationPolicy, Scope,
};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::controller::QueryController;
use crate::coordinator::{FlightHandle, RequestCoordinator};
use crate::fetch::{FetchError, PageFetcher, PageRequest};
use crate::models::Page;

struct Inner {
    store: Mutex<CacheStore>,
    coordinator: RequestCoordinator<CacheKey, Arc<CacheEntry>>,
    fetcher: Arc<dyn PageFetcher>,
    policy: RevalidationPolicy,
    clock: Arc<dyn Clock>,
}

/// Shared handle to the session cache. Clone is cheap.
#[derive(Clone)]
pub struct RosterCache {
    inner: Arc<Inner>,
}

impl RosterCache {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &CacheConfig) -> Self {
        Self::with_clock(fetcher, config.policy(), Arc::new(SystemClock))
    }

    pub fn with_clock(
        fetcher: Arc<dyn PageFetcher>,
        policy: RevalidationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(CacheStore::new()),
                coordinator: RequestCoordinator::new(),
                fetcher,
                policy,
                clock,
            }),
        }
    }

    /// A fresh controller for one view.
    pub fn controller(&self) -> QueryController {
        QueryController::new(self.clone())
    }

    fn store(&self) -> MutexGuard<'_, CacheStore> {
        self.inner.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn policy(&self) -> RevalidationPolicy {
        self.inner.policy
    }

    /// Current snapshot for `key`, with staleness evaluated now.
    pub fn read(&self, key: &CacheKey) -> Option<CachedPage> {
        self.lookup(key).1
    }

    /// Classify `key` and return whatever is cached for it.
    pub fn lookup(&self, key: &CacheKey) -> (Freshness, Option<CachedPage>) {
        let entry = self.store().get(&key.scope, &key.query);
        let now = self.now();
        let freshness = self.inner.policy.classify(entry.as_deref(), now);
        let snapshot = entry.map(|e| CachedPage::new(e, freshness == Freshness::StaleHit));
        (freshness, snapshot)
    }

    pub fn subscribe(&self, key: &CacheKey) -> watch::Receiver<Option<Arc<CacheEntry>>> {
        self.store().subscribe(&key.scope, &key.query)
    }

    /// Start (or join) the fetch for `key`. A successful result is written to
    /// the store only if the request is still current when it lands.
    pub fn fetch(&self, key: &CacheKey) -> FlightHandle<Arc<CacheEntry>> {
        let cache = self.clone();
        let flight_key = key.clone();
        self.inner.coordinator.fetch_once(key.clone(), move |ticket| {
            let generation = ticket.generation;
            let request = PageRequest::from_key(&flight_key);
            let work = cache.inner.fetcher.fetch_page(request, ticket.cancel);
            async move {
                let page = work.await?;
                check_page(&flight_key, &page)?;
                let entry = CacheEntry::new(page, cache.now()).ok_or_else(|| {
                    FetchError::InvalidResponse(format!(
                        "page larger than its page size for {}",
                        flight_key
                    ))
                })?;

                let mut stored = None;
                let current = cache
                    .inner
                    .coordinator
                    .if_current(&flight_key, generation, || {
                        stored = Some(cache.store().put(
                            &flight_key.scope,
                            &flight_key.query,
                            entry.clone(),
                        ));
                    });
                if !current {
                    debug!(key = %flight_key, generation, "Discarding superseded result");
                    return Err(FetchError::Cancelled);
                }
                Ok(stored.unwrap_or_else(|| Arc::new(entry)))
            }
        })
    }

    /// Cancel the live request for `key`, if any.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        self.inner.coordinator.cancel(key)
    }

    pub(crate) fn release(&self, key: &CacheKey, generation: u64) -> bool {
        self.inner.coordinator.release(key, generation)
    }

    pub(crate) fn is_live(&self, key: &CacheKey, generation: u64) -> bool {
        self.inner.coordinator.is_live(key, generation)
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.inner.coordinator.is_in_flight(key)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.coordinator.in_flight()
    }

    /// Mark one page expired; it stays readable and refreshes on next use.
    pub fn invalidate(&self, scope: &Scope, query: &QueryKey) -> bool {
        self.store().invalidate(scope, query)
    }

    /// Mark a whole community's pages expired, e.g. after a roster change.
    pub fn invalidate_scope(&self, scope: &Scope) -> usize {
        let count = self.store().invalidate_scope(scope);
        if count > 0 {
            debug!(scope = %scope, entries = count, "Roster pages invalidated");
        }
        count
    }

    /// Forget everything: cancel all requests and empty the store.
    pub fn reset(&self) {
        let cancelled = self.inner.coordinator.cancel_all();
        let mut store = self.store();
        let entries = store.len();
        store.clear();
        info!(entries, cancelled, "Roster cache reset");
    }

    pub fn len(&self) -> usize {
        self.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }
}

/// A response must be the page that was asked for and fit the requested page
/// size, whatever the server claims in its own pagination block.
fn check_page(key: &CacheKey, page: &Page) -> Result<(), FetchError> {
    let requested = &key.query;
    if page.len() > requested.page_size() as usize {
        return Err(FetchError::InvalidResponse(format!(
            "{} records for page size {} ({})",
            page.len(),
            requested.page_size(),
            key
        )));
    }
    if page.pagination.page != requested.page() {
        return Err(FetchError::InvalidResponse(format!(
            "got page {} for {}",
            page.pagination.page, key
        )));
    }
    Ok(())
}
