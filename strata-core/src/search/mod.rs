//! Web search provider abstraction.
//!
//! The pipeline only depends on `SearchProvider`; the concrete HTTP client
//! lives in `tavily`, and `MockSearchProvider` drives the tests.

pub mod tavily;

pub use tavily::TavilySearchProvider;

use crate::config::SearchConfig;
use crate::error::{ConfigError, SearchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

/// A search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
    /// Provider search depth ("basic" or "advanced").
    pub depth: String,
}

/// A single ranked search result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Trait for web-search providers.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Execute a search and return results in ranked order.
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, SearchError>;

    /// Maximum query length accepted by the provider, in characters.
    fn max_query_chars(&self) -> usize {
        400
    }

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Create a search provider based on the configuration.
pub fn create_search_provider(
    config: &SearchConfig,
) -> Result<Arc<dyn SearchProvider>, ConfigError> {
    match config.provider.as_str() {
        "tavily" => {
            info!(provider = "tavily", depth = %config.search_depth, "Creating search provider");
            Ok(Arc::new(TavilySearchProvider::new(config)?))
        }
        other => Err(ConfigError::UnsupportedProvider {
            kind: "search".into(),
            name: other.to_string(),
        }),
    }
}

type SearchHandler = dyn Fn(&SearchRequest) -> Result<Vec<SearchHit>, SearchError> + Send + Sync;

/// A mock search provider for testing.
///
/// Results come from the handler closure (or are empty); every request is recorded.
pub struct MockSearchProvider {
    handler: Option<Arc<SearchHandler>>,
    requests: Mutex<Vec<SearchRequest>>,
    max_query_chars: usize,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self {
            handler: None,
            requests: Mutex::new(Vec::new()),
            max_query_chars: 400,
        }
    }

    /// Create a mock whose results are computed from each request.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&SearchRequest) -> Result<Vec<SearchHit>, SearchError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::new()
        }
    }

    /// Create a mock that returns `per_query` distinct hits for every query.
    ///
    /// Urls are derived from the query text so repeated queries produce duplicates.
    pub fn with_generated_hits(per_query: usize) -> Self {
        Self::with_handler(move |req| {
            let slug: String = req
                .query
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
                .collect();
            Ok((0..per_query.min(req.max_results))
                .map(|i| SearchHit {
                    title: format!("{} result {}", req.query, i + 1),
                    url: format!("https://example{i}.com/{slug}"),
                    content: format!("Content about {} from result {}.", req.query, i + 1),
                    ..Default::default()
                })
                .collect())
        })
    }

    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockSearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        match &self.handler {
            Some(handler) => handler(&request),
            None => Ok(Vec::new()),
        }
    }

    fn max_query_chars(&self) -> usize {
        self.max_query_chars
    }

    fn name(&self) -> &str {
        "mock"
    }
}
