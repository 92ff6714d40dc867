//! Request and response types for the LLM collaborator.

use serde::{Deserialize, Serialize};

/// A single chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User prompt
    pub prompt: String,
    /// Optional system prompt
    pub system: Option<String>,
    /// Sampling temperature (0.0 - 1.0)
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }
}

/// Token usage statistics reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Outcome of a chat request.
///
/// Failures are data, not panics: a response with `success == false`
/// carries the provider's error text and is converted into stage
/// fallbacks by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub success: bool,
    pub content: String,
    pub error: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// Build a successful response.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
            usage: None,
        }
    }

    /// Build a failed response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = ChatRequest::new("analyze this")
            .with_system("you are a verifier")
            .with_temperature(1.4);
        assert_eq!(req.prompt, "analyze this");
        assert_eq!(req.system.as_deref(), Some("you are a verifier"));
        assert_eq!(req.temperature, Some(1.0)); // clamped
    }

    #[test]
    fn test_response_constructors() {
        let ok = LlmResponse::ok("fine");
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = LlmResponse::err("rate limited");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("rate limited"));
        assert!(err.content.is_empty());
    }
}
