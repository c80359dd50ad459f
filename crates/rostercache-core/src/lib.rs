//! Core library for rostercache - a client-side cache for paginated
//! community member rosters.
//!
//! Repeat views are served from memory, stale pages are shown immediately
//! and refreshed in the background, concurrent requests for the same page
//! share one network call, and results nobody is waiting for any more are
//! discarded instead of overwriting newer data.
//!
//! ```ignore
//! let api = ApiClient::new(&config.api_base_url)?.with_token(token);
//! let cache = RosterCache::new(Arc::new(api), &config);
//!
//! let mut roster = cache.controller();
//! roster.request_query("guild-42", 1, 20, None);
//! roster.wait_idle().await;
//! for member in roster.records() {
//!     println!("{}", member.name());
//! }
//! ```

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod fetch;
pub mod models;
pub mod session;

pub use api::{ApiClient, ApiError};
pub use cache::{CacheEntry, CacheKey, CacheStore, CachedPage, Freshness, QueryKey, RevalidationPolicy, Scope};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use controller::{QueryController, QueryState};
pub use coordinator::{FlightHandle, RequestCoordinator, Ticket};
pub use fetch::{CancelSignal, FetchError, PageFetcher, PageRequest};
pub use models::{Member, MemberRole, Page, Pagination};
pub use session::RosterCache;
