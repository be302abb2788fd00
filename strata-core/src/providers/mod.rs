//! LLM provider construction.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatibleProvider;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::ConfigError;
use std::sync::Arc;
use tracing::info;

/// Create an LLM provider based on the configuration.
///
/// Missing credentials surface here, before any research work starts.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    match config.provider.as_str() {
        "openai" | "azure" | "local" | "ollama" | "vllm" => {
            info!(provider = %config.provider, model = %config.model, "Creating LLM provider");
            Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
        }
        other => Err(ConfigError::UnsupportedProvider {
            kind: "LLM".into(),
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..LlmConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, ConfigError::UnsupportedProvider { .. }));
    }

    #[test]
    fn test_create_with_explicit_key() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
    }
}
