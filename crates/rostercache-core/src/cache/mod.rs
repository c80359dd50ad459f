//! In-memory roster page cache.
//!
//! Pages are stored per scope (community) under a canonical `QueryKey`.
//! Staleness is derived at read time from the entry's fetch timestamp;
//! there is no background timer and no eviction.

pub mod entry;
pub mod key;
pub mod policy;
pub mod store;

pub use entry::{CacheEntry, CachedPage};
pub use key::{CacheKey, QueryKey, Scope};
pub use policy::{Freshness, RevalidationPolicy, DEFAULT_STALE_AFTER_SECS};
pub use store::CacheStore;
