mod ollama;
mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// A single completion request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Instructions sent as the system message
    pub system_prompt: String,
    /// The user message
    pub prompt: String,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    /// Timeout for the request
    pub timeout: Duration,
    /// Optional model override (e.g., "gpt-4o" instead of configured model)
    pub model_override: Option<String>,
    /// Ask the provider for a JSON-only response where supported
    pub json_mode: bool,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// A "provider:model" reference such as `openai:gpt-4o-mini`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn parse(raw: &str) -> LlmResult<Self> {
        match raw.trim().split_once(':') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Ok(Self {
                provider: provider.to_string(),
                model: model.to_string(),
            }),
            _ => Err(LlmError::ConfigError(format!(
                "Invalid model ID '{}', expected 'provider:model'",
                raw
            ))),
        }
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// The set of configured providers, looked up by name
#[derive(Clone, Default)]
pub struct LlmManager {
    pub providers: Vec<Arc<dyn LlmProvider>>,
}

impl LlmManager {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Find a configured provider by name
    pub fn provider(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }
}

/// Configuration for the answer arbiters
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Model asked first
    pub primary: String,
    /// Model asked when the primary fails
    pub secondary: String,
    pub primary_timeout: Duration,
    pub secondary_timeout: Duration,
    /// Max tokens for the verdict JSON
    pub max_tokens: u32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            ollama_base_url: Some("http://localhost:11434".to_string()),
            primary: "openai:gpt-4o-mini".to_string(),
            secondary: "ollama:llama3.2".to_string(),
            primary_timeout: Duration::from_secs(8),
            secondary_timeout: Duration::from_secs(5),
            max_tokens: 400,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl ArbiterConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ollama_base_url = match std::env::var("OLLAMA_BASE_URL") {
            Ok(url) => {
                let trimmed = url.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(_) => defaults.ollama_base_url.clone(),
        };

        let secs = |key: &str, fallback: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            ollama_base_url,
            primary: non_empty_var("ARBITER_PRIMARY").unwrap_or(defaults.primary),
            secondary: non_empty_var("ARBITER_SECONDARY").unwrap_or(defaults.secondary),
            primary_timeout: secs("ARBITER_PRIMARY_TIMEOUT", defaults.primary_timeout),
            secondary_timeout: secs("ARBITER_SECONDARY_TIMEOUT", defaults.secondary_timeout),
            max_tokens: std::env::var("ARBITER_MAX_TOKENS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.max_tokens),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

        if let Some(api_key) = &self.openai_api_key {
            providers.push(Arc::new(OpenAiProvider::new(api_key.clone())));
        }

        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Arc::new(OllamaProvider::new(base_url.clone())?));
        }

        Ok(LlmManager::new(providers))
    }
}
