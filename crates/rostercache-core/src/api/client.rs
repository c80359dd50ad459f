//! HTTP client for the community members API.
//!
//! `ApiClient` implements `PageFetcher`, so it can be handed straight to a
//! `RosterCache`. Cancellation drops the in-flight reqwest future, which
//! aborts the underlying request.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::debug;

use crate::fetch::{CancelSignal, FetchError, PageFetcher, PageRequest};
use crate::models::{Member, Page, Pagination};

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Body of `GET /guilds/{id}/members`.
#[derive(Debug, Deserialize)]
struct MembersResponse {
    members: Vec<Member>,
    pagination: Pagination,
}

/// API client for the members endpoint.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn members_url(&self, scope: &str) -> String {
        format!("{}/guilds/{}/members", self.base_url, scope)
    }

    fn query_params(request: &PageRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", request.page.to_string()),
            ("pageSize", request.page_size.to_string()),
        ];
        if let Some(ref search) = request.search {
            params.push(("search", search.clone()));
        }
        params
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    fn parse_members(text: &str) -> Result<Page, ApiError> {
        let parsed: MembersResponse = serde_json::from_str(text)
            .map_err(|e| ApiError::InvalidResponse(format!("members payload: {}", e)))?;
        Ok(Page::new(parsed.members, parsed.pagination))
    }

    /// Fetch one page of a community's members.
    pub async fn fetch_members(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let url = self.members_url(request.scope.as_str());

        let mut builder = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .query(&Self::query_params(request));
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }

        let response = Self::check_response(builder.send().await?).await?;
        let text = response.text().await?;
        let page = Self::parse_members(&text)?;
        debug!(
            scope = %request.scope,
            page = request.page,
            records = page.len(),
            "Members page received"
        );
        Ok(page)
    }
}

impl PageFetcher for ApiClient {
    fn fetch_page(
        &self,
        request: PageRequest,
        cancel: CancelSignal,
    ) -> BoxFuture<'static, Result<Page, FetchError>> {
        let api = self.clone();
        async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                result = api.fetch_members(&request) => result.map_err(FetchError::from),
            }
        }
        .boxed()
    }
}
