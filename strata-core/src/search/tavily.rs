//! Tavily search API client.

use super::{SearchHit, SearchProvider, SearchRequest, truncate_chars};
use crate::config::{SearchConfig, resolve_credential};
use crate::error::{ConfigError, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

impl From<TavilyResult> for SearchHit {
    fn from(r: TavilyResult) -> Self {
        SearchHit {
            title: r.title,
            url: r.url,
            content: r.content,
            raw_content: r.raw_content.filter(|c| !c.is_empty()),
            published_date: r.published_date.filter(|d| !d.is_empty()),
            author: r.author.filter(|a| !a.is_empty()),
        }
    }
}

/// Search provider backed by the Tavily REST API.
pub struct TavilySearchProvider {
    client: Client,
    base_url: String,
    api_key: String,
    max_query_chars: usize,
}

impl TavilySearchProvider {
    /// Create a new provider; a missing API key is a configuration error.
    pub fn new(config: &SearchConfig) -> Result<Self, ConfigError> {
        let api_key = resolve_credential(config.api_key.as_ref(), &config.api_key_env)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("Strata/0.3")
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.tavily.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            max_query_chars: config.max_query_chars,
        })
    }

    fn parse_results(body: &str) -> Result<Vec<SearchHit>, SearchError> {
        let parsed: TavilyResponse =
            serde_json::from_str(body).map_err(|e| SearchError::ResponseParse {
                message: format!("Invalid JSON: {e}"),
            })?;
        Ok(parsed.results.into_iter().map(SearchHit::from).collect())
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        let query = truncate_chars(request.query.trim(), self.max_query_chars);
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let body = json!({
            "query": query,
            "max_results": request.max_results,
            "search_depth": request.depth,
            "include_raw_content": false,
        });

        debug!(query = %query, max_results = request.max_results, "Sending Tavily search");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::ApiRequest {
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| SearchError::ApiRequest {
            message: format!("Failed to read response body: {e}"),
        })?;

        match status.as_u16() {
            200..=299 => Self::parse_results(&text),
            401 | 403 => Err(SearchError::AuthFailed {
                provider: "tavily".into(),
            }),
            429 => Err(SearchError::RateLimited {
                retry_after_secs: 10,
            }),
            code => Err(SearchError::ApiRequest {
                message: format!("HTTP {code}: {text}"),
            }),
        }
    }

    fn max_query_chars(&self) -> usize {
        self.max_query_chars
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results() {
        let body = r#"{
            "query": "lithium recycling",
            "results": [
                {"title": "Recycling lithium", "url": "https://www.nature.com/articles/x1",
                 "content": "Hydrometallurgy...", "score": 0.93, "published_date": "2024-03-01"},
                {"title": "Battery news", "url": "https://reuters.com/b", "content": "",
                 "raw_content": "", "author": ""}
            ]
        }"#;
        let hits = TavilySearchProvider::parse_results(body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].published_date.as_deref(), Some("2024-03-01"));
        assert!(hits[1].raw_content.is_none());
        assert!(hits[1].author.is_none());
    }

    #[test]
    fn test_parse_results_invalid_json() {
        assert!(matches!(
            TavilySearchProvider::parse_results("<html>"),
            Err(SearchError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = SearchConfig {
            api_key_env: "STRATA_TEST_SURELY_UNSET_VARIABLE".into(),
            ..SearchConfig::default()
        };
        assert!(matches!(
            TavilySearchProvider::new(&config),
            Err(ConfigError::MissingCredential { .. })
        ));
    }
}
