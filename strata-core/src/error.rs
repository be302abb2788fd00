//! Error types for the Strata research core.
//!
//! Uses `thiserror` for public API error types. Only configuration errors and an
//! exhausted time budget abort a run; everything else is absorbed by the
//! pipeline stage that hit it.

/// Top-level error type for the Strata core library.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Research run for depth '{depth}' exceeded its {timeout_secs}s budget")]
    Timeout { depth: String, timeout_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from language-model provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider returned an empty completion")]
    EmptyResponse,
}

/// Errors from web-search provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {message}")]
    ApiRequest { message: String },

    #[error("Search response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for search provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by search provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Empty search query")]
    EmptyQuery,
}

/// Errors from the configuration system.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: String },

    #[error("Unsupported {kind} provider: {name}")]
    UnsupportedProvider { kind: String, name: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `StrataError`.
pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = StrataError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_missing_credential() {
        let err = StrataError::Config(ConfigError::MissingCredential {
            var: "TAVILY_API_KEY".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing credential: environment variable TAVILY_API_KEY is not set"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = StrataError::Timeout {
            depth: "quick".into(),
            timeout_secs: 300,
        };
        assert_eq!(
            err.to_string(),
            "Research run for depth 'quick' exceeded its 300s budget"
        );
    }

    #[test]
    fn test_search_error_conversion() {
        let err: StrataError = SearchError::EmptyQuery.into();
        assert!(matches!(err, StrataError::Search(SearchError::EmptyQuery)));
    }
}
