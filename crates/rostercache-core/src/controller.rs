//! Per-view query state.
//!
//! A `QueryController` backs one roster view. Each `request_query` call is
//! served from the cache when possible; fetches run on spawned tasks and
//! report back over a channel. Nothing changes until the owner drains that
//! channel with `apply_outcomes` (non-blocking) or `next_update` /
//! `wait_idle` (async), so results land in one place, in order.
//!
//! Results for requests the controller has stopped caring about, because
//! the view moved on to another query or was closed, are dropped quietly.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, CachedPage, Freshness, QueryKey, Scope};
use crate::coordinator::FlightResult;
use crate::fetch::FetchError;
use crate::models::{Member, Pagination};
use crate::session::RosterCache;

/// Buffer size for the fetch outcome channel.
/// A view rarely has more than a couple of requests pending at once.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// What the view should currently show.
#[derive(Debug, Clone)]
pub enum QueryState {
    /// Nothing requested yet, or the controller was closed.
    Idle,
    /// Waiting on a fetch with nothing cached to show.
    Loading { key: CacheKey },
    /// Data on screen. May be stale while a background refresh runs.
    Success { key: CacheKey, page: CachedPage },
    /// The fetch failed. The cache was left untouched.
    Failure { key: CacheKey, error: FetchError },
}

impl QueryState {
    pub fn key(&self) -> Option<&CacheKey> {
        match self {
            QueryState::Idle => None,
            QueryState::Loading { key }
            | QueryState::Success { key, .. }
            | QueryState::Failure { key, .. } => Some(key),
        }
    }

    pub fn page(&self) -> Option<&CachedPage> {
        match self {
            QueryState::Success { page, .. } => Some(page),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            QueryState::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    /// The view is waiting on this result.
    Load,
    /// Stale data is already showing; this only refreshes the cache.
    Revalidate,
}

#[derive(Debug)]
struct Pending {
    generation: u64,
    purpose: Purpose,
}

struct FetchOutcome {
    key: CacheKey,
    generation: u64,
    result: FlightResult<Arc<CacheEntry>>,
}

pub struct QueryController {
    cache: RosterCache,
    state: QueryState,
    pending: HashMap<CacheKey, Pending>,
    outcome_tx: mpsc::Sender<FetchOutcome>,
    outcome_rx: mpsc::Receiver<FetchOutcome>,
}

impl QueryController {
    pub fn new(cache: RosterCache) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        Self {
            cache,
            state: QueryState::Idle,
            pending: HashMap::new(),
            outcome_tx,
            outcome_rx,
        }
    }

    /// Ask for one page of one community's roster.
    ///
    /// Returns the state to render right away: cached data when there is any
    /// (refreshing it in the background if stale), `Loading` otherwise. A
    /// pending load for a different query is abandoned.
    pub fn request_query(
        &mut self,
        scope: impl Into<Scope>,
        page: u32,
        page_size: u32,
        search: Option<&str>,
    ) -> &QueryState {
        let key = CacheKey::new(scope.into(), QueryKey::new(page, page_size, search));
        self.request(key)
    }

    pub fn request(&mut self, key: CacheKey) -> &QueryState {
        self.apply_outcomes();
        self.supersede(&key);

        let (freshness, snapshot) = self.cache.lookup(&key);
        match (freshness, snapshot) {
            (Freshness::Hit, Some(page)) => {
                debug!(key = %key, "Cache hit");
                self.state = QueryState::Success { key, page };
            }
            (Freshness::StaleHit, Some(page)) => {
                debug!(key = %key, "Stale cache hit; revalidating");
                self.start(key.clone(), Purpose::Revalidate);
                self.state = QueryState::Success { key, page };
            }
            _ => {
                debug!(key = %key, "Cache miss");
                self.start(key.clone(), Purpose::Load);
                self.state = QueryState::Loading { key };
            }
        }
        &self.state
    }

    /// Re-issue the current query after a failure. Retries only happen when
    /// the user asks for one.
    pub fn retry(&mut self) -> &QueryState {
        match self.state.key().cloned() {
            Some(key) => self.request(key),
            None => &self.state,
        }
    }

    /// Refresh the current query regardless of age. Cached data stays on
    /// screen while the refresh runs.
    pub fn refresh(&mut self) -> &QueryState {
        self.apply_outcomes();
        let Some(key) = self.state.key().cloned() else {
            return &self.state;
        };
        match self.cache.read(&key) {
            Some(page) => {
                self.start(key.clone(), Purpose::Revalidate);
                self.state = QueryState::Success { key, page };
                &self.state
            }
            None => self.request(key),
        }
    }

    /// Abandon pending loads for anything other than `key`. Background
    /// revalidations keep running; they only update the cache.
    fn supersede(&mut self, key: &CacheKey) {
        let abandoned: Vec<CacheKey> = self
            .pending
            .iter()
            .filter(|(k, p)| *k != key && p.purpose == Purpose::Load)
            .map(|(k, _)| k.clone())
            .collect();

        for old in abandoned {
            if let Some(p) = self.pending.remove(&old) {
                self.cache.release(&old, p.generation);
                debug!(key = %old, superseded_by = %key, "Abandoned pending load");
            }
        }
    }

    fn start(&mut self, key: CacheKey, purpose: Purpose) {
        // A request that settled but whose outcome is still queued does not
        // count; that outcome is ignored once a new request replaces it.
        let live = self
            .pending
            .get(&key)
            .map(|p| self.cache.is_live(&key, p.generation));
        match live {
            Some(true) => {
                if let Some(existing) = self.pending.get_mut(&key) {
                    if purpose == Purpose::Load {
                        existing.purpose = Purpose::Load;
                    }
                }
                return;
            }
            Some(false) => {
                self.pending.remove(&key);
            }
            None => {}
        }

        let handle = self.cache.fetch(&key);
        let generation = handle.generation();
        let tx = self.outcome_tx.clone();
        let task_key = key.clone();
        tokio::spawn(async move {
            let result = handle.wait().await;
            let outcome = FetchOutcome {
                key: task_key,
                generation,
                result,
            };
            if tx.send(outcome).await.is_err() {
                debug!("Query controller closed before fetch settled");
            }
        });

        self.pending.insert(key, Pending { generation, purpose });
    }

    /// Apply every outcome that has already arrived. Returns true if the
    /// visible state changed.
    pub fn apply_outcomes(&mut self) -> bool {
        let mut changed = false;
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            changed |= self.apply(outcome);
        }
        changed
    }

    /// Wait for the next outcome and apply it along with anything else that
    /// has arrived. Returns false immediately when nothing is pending.
    pub async fn next_update(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        match self.outcome_rx.recv().await {
            Some(outcome) => {
                let changed = self.apply(outcome);
                self.apply_outcomes() || changed
            }
            None => false,
        }
    }

    /// Wait until every request this controller still cares about settled.
    pub async fn wait_idle(&mut self) {
        while !self.pending.is_empty() {
            match self.outcome_rx.recv().await {
                Some(outcome) => {
                    self.apply(outcome);
                }
                None => break,
            }
        }
    }

    fn apply(&mut self, outcome: FetchOutcome) -> bool {
        let FetchOutcome {
            key,
            generation,
            result,
        } = outcome;

        let owned = self
            .pending
            .get(&key)
            .is_some_and(|p| p.generation == generation);
        if !owned {
            debug!(key = %key, generation, "Ignoring result of abandoned request");
            return false;
        }
        let Some(pending) = self.pending.remove(&key) else {
            return false;
        };
        let is_current = self.state.key() == Some(&key);

        match result {
            Ok(entry) => {
                if !is_current {
                    return false;
                }
                let page = self
                    .cache
                    .read(&key)
                    .unwrap_or_else(|| CachedPage::new(entry, false));
                self.state = QueryState::Success { key, page };
                true
            }
            Err(e) if e.is_cancelled() => {
                debug!(key = %key, "Request cancelled");
                if is_current && self.state.is_loading() {
                    self.state = QueryState::Idle;
                    return true;
                }
                false
            }
            Err(error) => match pending.purpose {
                Purpose::Load if is_current => {
                    warn!(key = %key, error = %error, "Roster page fetch failed");
                    self.state = QueryState::Failure { key, error };
                    true
                }
                Purpose::Load => false,
                Purpose::Revalidate => {
                    warn!(key = %key, error = %error, "Background refresh failed; keeping cached page");
                    false
                }
            },
        }
    }

    /// Stop caring about everything this controller started. Shared requests
    /// other views still wait on keep running.
    pub fn close(&mut self) {
        for (key, p) in self.pending.drain() {
            self.cache.release(&key, p.generation);
            debug!(key = %key, "Released request on close");
        }
        self.state = QueryState::Idle;
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn cache(&self) -> &RosterCache {
        &self.cache
    }

    pub fn records(&self) -> &[Member] {
        self.state.page().map(|p| p.records()).unwrap_or(&[])
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.state.page().map(|p| p.pagination())
    }

    pub fn is_stale(&self) -> bool {
        self.state.page().is_some_and(|p| p.is_stale())
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// True while stale data is showing and a refresh for it is pending.
    pub fn is_refreshing(&self) -> bool {
        match &self.state {
            QueryState::Success { key, .. } => self
                .pending
                .get(key)
                .is_some_and(|p| p.purpose == Purpose::Revalidate),
            _ => false,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.state.error()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for QueryController {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::fetch::{CancelSignal, PageRequest};
    use crate::models::{MemberRole, Page};

    fn page_for(req: &PageRequest, names: &[&str]) -> Page {
        let records = names
            .iter()
            .map(|n| Member {
                id: n.to_string(),
                username: n.to_string(),
                display_name: None,
                role: MemberRole::Member,
                joined_at: None,
                rating: None,
            })
            .collect();
        Page::new(
            records,
            Pagination {
                page: req.page,
                page_size: req.page_size,
                total_pages: 3,
                total_count: 60,
            },
        )
    }

    #[tokio::test]
    async fn test_state_accessors_follow_lifecycle() {
        let fetcher = |req: PageRequest, _: CancelSignal| async move {
            Ok::<_, FetchError>(page_for(&req, &["a", "b"]))
        };
        let cache = RosterCache::new(Arc::new(fetcher), &CacheConfig::default());
        let mut controller = cache.controller();

        assert!(matches!(controller.state(), QueryState::Idle));
        assert!(controller.records().is_empty());

        controller.request_query("g", 1, 20, None);
        assert!(controller.is_loading());
        assert!(controller.pagination().is_none());

        controller.wait_idle().await;
        assert!(!controller.is_loading());
        assert_eq!(controller.records().len(), 2);
        assert_eq!(controller.pagination().map(|p| p.total_pages), Some(3));
        assert!(!controller.is_stale());
        assert!(!controller.is_refreshing());
        assert!(controller.error().is_none());
        assert_eq!(controller.pending(), 0);
    }

    #[tokio::test]
    async fn test_failure_then_retry() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let fetcher = move |req: PageRequest, _: CancelSignal| {
            let attempt = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(FetchError::Transient("503".into()))
                } else {
                    Ok(page_for(&req, &["a"]))
                }
            }
        };
        let cache = RosterCache::new(Arc::new(fetcher), &CacheConfig::default());
        let mut controller = cache.controller();

        controller.request_query("g", 1, 20, None);
        controller.wait_idle().await;
        assert!(matches!(controller.error(), Some(FetchError::Transient(_))));
        assert!(cache.is_empty());

        controller.retry();
        assert!(controller.is_loading());
        controller.wait_idle().await;
        assert_eq!(controller.records().len(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_is_distinct() {
        let fetcher = |_: PageRequest, _: CancelSignal| async {
            Err::<Page, _>(FetchError::PermissionDenied("admins only".into()))
        };
        let cache = RosterCache::new(Arc::new(fetcher), &CacheConfig::default());
        let mut controller = cache.controller();

        controller.request_query("g", 1, 20, None);
        controller.wait_idle().await;
        let error = controller.error().expect("failed");
        assert!(error.is_permission_denied());
        assert_eq!(
            error.user_message(),
            "You don't have permission to view this roster"
        );
    }

    #[tokio::test]
    async fn test_close_resets_state() {
        let fetcher = |_: PageRequest, _: CancelSignal| std::future::pending::<Result<Page, FetchError>>();
        let cache = RosterCache::new(Arc::new(fetcher), &CacheConfig::default());
        let mut controller = cache.controller();

        controller.request_query("g", 1, 20, None);
        assert_eq!(cache.in_flight(), 1);

        controller.close();
        assert!(matches!(controller.state(), QueryState::Idle));
        assert_eq!(controller.pending(), 0);
        assert_eq!(cache.in_flight(), 0);
        assert!(!controller.next_update().await);
    }
}
