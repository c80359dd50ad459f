//! Boundary to whatever actually loads roster pages.
//!
//! The cache never talks HTTP itself. It hands a `PageRequest` and a
//! `CancelSignal` to a `PageFetcher` and gets back a page or a `FetchError`.
//! `crate::api::ApiClient` is the production implementation; any
//! `Fn(PageRequest, CancelSignal) -> impl Future` closure works too.

pub mod cancel;
pub mod error;

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::cache::{CacheKey, QueryKey, Scope};
use crate::models::Page;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use error::FetchError;

/// What to load: one page of one scope's roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub scope: Scope,
    pub page: u32,
    pub page_size: u32,
    /// Normalized search term, `None` when unfiltered.
    pub search: Option<String>,
}

impl PageRequest {
    pub fn from_key(key: &CacheKey) -> Self {
        Self::new(key.scope.clone(), &key.query)
    }

    pub fn new(scope: Scope, query: &QueryKey) -> Self {
        Self {
            scope,
            page: query.page(),
            page_size: query.page_size(),
            search: query.has_search().then(|| query.search().to_string()),
        }
    }
}

pub trait PageFetcher: Send + Sync {
    /// Load one page. Implementations should stop work once `cancel` fires;
    /// the cache ignores whatever they return afterwards either way.
    fn fetch_page(
        &self,
        request: PageRequest,
        cancel: CancelSignal,
    ) -> BoxFuture<'static, Result<Page, FetchError>>;
}

impl<F, Fut> PageFetcher for F
where
    F: Fn(PageRequest, CancelSignal) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page, FetchError>> + Send + 'static,
{
    fn fetch_page(
        &self,
        request: PageRequest,
        cancel: CancelSignal,
    ) -> BoxFuture<'static, Result<Page, FetchError>> {
        self(request, cancel).boxed()
    }
}
