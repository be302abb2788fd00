//! # Strata Core
//!
//! Core library for the Strata research pipeline.
//! Provides depth profiles, aspect planning, search synthesis, source
//! deduplication, report composition, quality validation, and refinement,
//! plus the language-model and search provider interfaces they run on.

pub mod brain;
pub mod config;
pub mod error;
pub mod providers;
pub mod research;
pub mod search;

// Re-export commonly used types at the crate root.
pub use brain::{CompletionRequest, CompletionResponse, LlmProvider, MockLlmProvider, TokenUsage};
pub use config::{LlmConfig, ResearchConfig, SearchConfig, StrataConfig, load_config};
pub use error::{ConfigError, LlmError, Result, SearchError, StrataError};
pub use research::{
    DepthProfile, QualityValidator, ResearchDepth, ResearchEngine, ResearchOutput,
    ResearchRequest, SourceRecord, ValidationResult,
};
pub use search::{MockSearchProvider, SearchHit, SearchProvider, SearchRequest};
