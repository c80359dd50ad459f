//! REST API client module for community rosters.
//!
//! This module provides the `ApiClient` for fetching member pages from the
//! community API. Requests carry a JWT bearer token supplied by the caller;
//! obtaining that token is outside this crate.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
