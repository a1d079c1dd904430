//! LLM trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{TemporaError, TemporaResult};
use crate::types::Message;

/// Response from LLM generation.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Generated text content.
    pub content: Option<String>,
    /// Token usage statistics.
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// Create a response carrying only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            usage: None,
        }
    }

    /// Get the content or an empty string.
    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Total tokens.
    pub total_tokens: u32,
}

/// Configuration options for LLM generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Top-p nucleus sampling.
    pub top_p: Option<f32>,
    /// Response format.
    pub response_format: Option<ResponseFormat>,
}

impl GenerationOptions {
    /// Options requesting a JSON object reply.
    pub fn json() -> Self {
        Self {
            response_format: Some(ResponseFormat::Json),
            ..Default::default()
        }
    }
}

/// Response format for LLM output.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Plain text response.
    Text,
    /// JSON object response.
    Json,
}

/// Core LLM trait - all LLM providers implement this.
///
/// Extraction, summarization, keyword classification and answer composition
/// all go through this one seam.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Generate a response from the LLM.
    async fn generate(
        &self,
        messages: &[Message],
        options: Option<GenerationOptions>,
    ) -> TemporaResult<LlmResponse>;

    /// Get the model name.
    fn model_name(&self) -> &str;

    /// Check if this model supports JSON mode.
    fn supports_json_mode(&self) -> bool {
        true
    }

    /// Generate and return the trimmed text, failing on an empty reply.
    async fn complete(
        &self,
        messages: &[Message],
        options: Option<GenerationOptions>,
    ) -> TemporaResult<String> {
        let response = self.generate(messages, options).await?;
        let text = response.content_or_empty().trim();
        if text.is_empty() {
            return Err(TemporaError::llm_invalid_response(format!(
                "{} returned an empty reply",
                self.model_name()
            )));
        }
        Ok(text.to_string())
    }
}

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name/identifier.
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Top-p nucleus sampling.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// API key (if not using environment variable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL for API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_top_p() -> f32 {
    1.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            api_key: None,
            base_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoLlm {
        reply: String,
    }

    #[async_trait]
    impl Llm for EchoLlm {
        async fn generate(
            &self,
            _messages: &[Message],
            _options: Option<GenerationOptions>,
        ) -> TemporaResult<LlmResponse> {
            Ok(LlmResponse::text(self.reply.clone()))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_complete_trims_reply() {
        let llm = EchoLlm {
            reply: "  YES \n".to_string(),
        };
        let text = llm.complete(&[Message::user("more?")], None).await.unwrap();
        assert_eq!(text, "YES");
    }

    #[tokio::test]
    async fn test_complete_rejects_blank_reply() {
        let llm = EchoLlm {
            reply: "   ".to_string(),
        };
        let err = llm.complete(&[Message::user("x")], None).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
