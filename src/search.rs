//! Web-search collaborator interface.
//!
//! Search backends sit behind [`SearchClient`]; the engine only sees
//! ranked hits. Outbound traffic goes through a shared minimum-interval
//! limiter because public search endpoints answer 202 to bursts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::llm::RateLimiter;

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Outcome of one search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// Wall-clock search time in seconds
    pub search_time: f64,
    pub success: bool,
}

impl SearchResponse {
    pub fn ok(results: Vec<SearchHit>, search_time: f64) -> Self {
        Self {
            results,
            search_time,
            success: true,
        }
    }

    pub fn failed(search_time: f64) -> Self {
        Self {
            results: Vec::new(),
            search_time,
            success: false,
        }
    }
}

/// The search collaborator the seed generator consumes.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> SearchResponse;
}

/// Global limiter for outbound search requests.
pub struct SearchRateLimiter {
    limiter: RateLimiter,
}

impl SearchRateLimiter {
    /// `interval_s` is the minimum spacing between requests in seconds.
    pub fn new(interval_s: f64) -> Self {
        Self {
            limiter: RateLimiter::new(Duration::from_secs_f64(interval_s.max(0.0))),
        }
    }

    pub async fn wait(&self) {
        self.limiter.wait().await;
    }
}
