//! Configuration system for Strata.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/strata/config.toml` and/or `.strata/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top-level configuration for Strata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
}

/// Language-model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" or "local" (any OpenAI-compatible endpoint).
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Explicit API key. Takes precedence over `api_key_env`; never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            api_key: None,
            max_tokens: 8192,
            temperature: 0.3,
            request_timeout_secs: 300,
        }
    }
}

/// Web-search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Provider name. Only "tavily" is currently supported.
    pub provider: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Explicit API key. Takes precedence over `api_key_env`; never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Provider query length limit; longer queries are truncated.
    pub max_query_chars: usize,
    /// Provider search depth ("basic" or "advanced").
    pub search_depth: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "tavily".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            base_url: None,
            api_key: None,
            max_query_chars: 400,
            search_depth: "advanced".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Research pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Depth used when a request does not name one.
    pub default_depth: String,
    /// Upper bound on findings context handed to the report writer.
    pub max_context_chars: usize,
    /// Temperature for query planning and gap analysis.
    pub planner_temperature: f32,
    /// Temperature for synthesis, writing, and refinement.
    pub writer_temperature: f32,
    /// Whether `run_with_budget` enforces the depth's wall-clock budget.
    pub enforce_timeout: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            default_depth: "comprehensive".to_string(),
            max_context_chars: 120_000,
            planner_temperature: 0.4,
            writer_temperature: 0.3,
            enforce_timeout: true,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `STRATA_`)
/// 3. Workspace-local config (`.strata/config.toml`)
/// 4. User config (`~/.config/strata/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&StrataConfig>,
) -> Result<StrataConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(StrataConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "strata", "strata") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".strata").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (STRATA_LLM__MODEL, STRATA_RESEARCH__DEFAULT_DEPTH, etc.)
    figment = figment.merge(Env::prefixed("STRATA_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: StrataConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

impl StrataConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.max_query_chars == 0 {
            return Err(ConfigError::Invalid {
                message: "search.max_query_chars must be greater than zero".into(),
            });
        }
        if self.research.max_context_chars == 0 {
            return Err(ConfigError::Invalid {
                message: "research.max_context_chars must be greater than zero".into(),
            });
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "llm.model must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Resolve a credential: explicit value first, then the named environment variable.
pub(crate) fn resolve_credential(
    explicit: Option<&String>,
    env_var: &str,
) -> Result<String, ConfigError> {
    explicit
        .cloned()
        .or_else(|| std::env::var(env_var).ok())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingCredential {
            var: env_var.to_string(),
        })
}
