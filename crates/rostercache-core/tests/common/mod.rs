// Not every test file uses every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use rostercache_core::{
    CacheConfig, CancelSignal, FetchError, ManualClock, Member, MemberRole, Page, PageFetcher,
    PageRequest, Pagination, RosterCache,
};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

/// Install a test log writer. Use RUST_LOG to see cache decisions.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn member(name: &str) -> Member {
    Member {
        id: format!("id-{}", name),
        username: name.to_string(),
        display_name: None,
        role: MemberRole::Member,
        joined_at: None,
        rating: None,
    }
}

pub fn page_of(names: &[&str], page: u32, page_size: u32, total_pages: u32, total_count: u64) -> Page {
    Page::new(
        names.iter().map(|n| member(n)).collect(),
        Pagination {
            page,
            page_size,
            total_pages,
            total_count,
        },
    )
}

pub fn usernames(records: &[Member]) -> Vec<String> {
    records.iter().map(|m| m.username.clone()).collect()
}

struct PendingCall {
    request: PageRequest,
    reply: oneshot::Sender<Result<Page, FetchError>>,
}

/// A fetcher whose calls stay open until the test answers them.
///
/// It ignores its cancel signal on purpose, like a transport that cannot
/// abort, so tests show the cache does not depend on cooperation.
#[derive(Default)]
pub struct ScriptedFetcher {
    calls: AtomicUsize,
    open: Mutex<Vec<PendingCall>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open.lock().expect("fetcher lock").len()
    }

    /// Wait until at least `n` calls have been made in total.
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..400 {
            if self.calls() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} fetch calls, saw {}", n, self.calls());
    }

    /// Answer the oldest open call matching `matches`. Returns false if no
    /// call matched or its caller had already gone away.
    pub fn respond(
        &self,
        matches: impl Fn(&PageRequest) -> bool,
        result: Result<Page, FetchError>,
    ) -> bool {
        let call = {
            let mut open = self.open.lock().expect("fetcher lock");
            match open.iter().position(|c| matches(&c.request)) {
                Some(i) => open.remove(i),
                None => return false,
            }
        };
        call.reply.send(result).is_ok()
    }

    /// Like `respond`, but answers the newest matching call.
    pub fn respond_latest(
        &self,
        matches: impl Fn(&PageRequest) -> bool,
        result: Result<Page, FetchError>,
    ) -> bool {
        let call = {
            let mut open = self.open.lock().expect("fetcher lock");
            match open.iter().rposition(|c| matches(&c.request)) {
                Some(i) => open.remove(i),
                None => return false,
            }
        };
        call.reply.send(result).is_ok()
    }

    pub fn respond_page(&self, page: u32, result: Result<Page, FetchError>) -> bool {
        self.respond(|r| r.page == page, result)
    }
}

impl PageFetcher for ScriptedFetcher {
    fn fetch_page(
        &self,
        request: PageRequest,
        _cancel: CancelSignal,
    ) -> BoxFuture<'static, Result<Page, FetchError>> {
        let (reply, rx) = oneshot::channel();
        self.open
            .lock()
            .expect("fetcher lock")
            .push(PendingCall { request, reply });
        self.calls.fetch_add(1, Ordering::SeqCst);
        async move {
            rx.await
                .unwrap_or_else(|_| Err(FetchError::Transient("fetcher dropped".into())))
        }
        .boxed()
    }
}

pub struct Harness {
    pub cache: RosterCache,
    pub fetcher: Arc<ScriptedFetcher>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    init_tracing();
    let fetcher = ScriptedFetcher::new();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let cache = RosterCache::with_clock(
        fetcher.clone(),
        CacheConfig::default().policy(),
        clock.clone(),
    );
    Harness {
        cache,
        fetcher,
        clock,
    }
}
