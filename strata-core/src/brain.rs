//! Brain module: language-model provider abstraction.
//!
//! Defines the `LlmProvider` trait consumed by every pipeline stage, the
//! request/response types that cross it, and a scriptable `MockLlmProvider`
//! used throughout the test suite.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A request to the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: Option<usize>,
    /// Ask the provider for JSON output.
    pub structured_output: bool,
    /// Per-request model override.
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max: usize) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn structured(mut self) -> Self {
        self.structured_output = true;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            user_prompt: String::new(),
            temperature: 0.7,
            max_output_tokens: None,
            structured_output: false,
            model: None,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// A response from the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Trait for language-model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Return the context window size for this provider/model.
    fn context_window(&self) -> usize {
        128_000
    }

    /// Whether this provider honours `structured_output` natively.
    fn supports_structured_output(&self) -> bool {
        false
    }
}

type MockHandler = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// A mock LLM provider for testing.
///
/// Responses come from, in order of precedence: the queue (FIFO), the
/// handler closure, or a fixed placeholder text. Every request is recorded.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<Vec<Result<String, LlmError>>>,
    handler: Option<Arc<MockHandler>>,
    requests: Mutex<Vec<CompletionRequest>>,
    context_window: usize,
    structured_output: bool,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(Vec::new()),
            handler: None,
            requests: Mutex::new(Vec::new()),
            context_window: 128_000,
            structured_output: true,
        }
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = tokens;
        self
    }

    pub fn with_structured_output(mut self, supported: bool) -> Self {
        self.structured_output = supported;
        self
    }

    /// Create a mock that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        let text = text.to_string();
        Self::with_handler(move |_| Ok(text.clone()))
    }

    /// Create a mock whose responses are computed from each request.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::new()
        }
    }

    /// Queue a text response for the next `complete` call.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.lock_responses().push(Ok(text.into()));
    }

    /// Queue an error for the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.lock_responses().push(Err(error));
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, Vec<Result<String, LlmError>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let queued = {
            let mut responses = self.lock_responses();
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };

        let text = match queued {
            Some(result) => result?,
            None => match &self.handler {
                Some(handler) => handler(&request)?,
                None => "I'm a mock LLM. No queued responses available.".to_string(),
            },
        };

        Ok(CompletionResponse {
            usage: TokenUsage {
                input_tokens: (request.system_prompt.len() + request.user_prompt.len()) / 4,
                output_tokens: text.len() / 4,
            },
            model: request.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: Some("stop".to_string()),
            text,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn supports_structured_output(&self) -> bool {
        self.structured_output
    }
}
