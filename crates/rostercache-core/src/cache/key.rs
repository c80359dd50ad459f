use std::fmt;

use serde::{Deserialize, Serialize};

/// Partition of the cache key space, one per community.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Scope {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Canonical identity of a roster page query.
///
/// Construction never fails: the search term is trimmed (empty and absent are
/// the same query) and a zero page or page size is clamped to 1. Lookups use
/// the structured value directly, so distinct queries cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    page: u32,
    page_size: u32,
    search: String,
}

impl QueryKey {
    pub fn new(page: u32, page_size: u32, search: Option<&str>) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
            search: normalize_search(search),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Normalized search term; empty when the query is unfiltered.
    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn has_search(&self) -> bool {
        !self.search.is_empty()
    }

    /// Same query, different page.
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }
}

/// Renders as `page:size:search`. Both numbers come first, so everything after
/// the second colon is the search term and the form stays unambiguous.
impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.page, self.page_size, self.search)
    }
}

fn normalize_search(search: Option<&str>) -> String {
    search.map(str::trim).unwrap_or_default().to_string()
}

/// A query qualified by its scope. In-flight tracking uses this so identical
/// page queries in two communities never share a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: Scope,
    pub query: QueryKey,
}

impl CacheKey {
    pub fn new(scope: Scope, query: QueryKey) -> Self {
        Self { scope, query }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.query)
    }
}
