//! Generative model abstraction.
//!
//! The chat handler only needs one capability from a model: turn a prompt string
//! into a completion string. Providers implement [`Provider`] so the gateway can
//! run against Gemini in production and against scripted models in tests.

mod gemini;

pub use gemini::GeminiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Trait
// ============================================================================

/// Text-completion capability of an LLM provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the model this provider sends requests to.
    fn model(&self) -> &str;

    /// Generate a completion for a single prompt.
    async fn generate(&self, prompt: &str) -> Result<Completion, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    /// Create an error without an upstream HTTP status.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Attach the upstream HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Response Types
// ============================================================================

/// A model completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text, untrimmed
    pub text: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

impl Completion {
    /// A completion carrying only text, with no usage data.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
            finish_reason: None,
            latency_ms: 0,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new("gemini", "gemini-2.5-pro", "quota exhausted").with_status(429);
        assert_eq!(err.to_string(), "[gemini:gemini-2.5-pro] quota exhausted");
        assert_eq!(err.status_code, Some(429));
    }

    #[test]
    fn test_completion_text_has_empty_usage() {
        let completion = Completion::text("Save 20% of income.");
        assert_eq!(completion.text, "Save 20% of income.");
        assert_eq!(completion.usage.total_tokens, 0);
        assert!(completion.finish_reason.is_none());
    }
}
