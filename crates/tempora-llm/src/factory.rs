//! Factory for creating LLM providers.

use std::sync::Arc;

use tempora_core::config::{LlmProvider, LlmProviderConfig};
use tempora_core::error::TemporaResult;
use tempora_core::traits::{Llm, LlmConfig};
use tracing::info;

use crate::gemini::GeminiLlm;
use crate::ollama::OllamaLlm;
use crate::openai::OpenAIProvider;

/// Factory for creating LLM providers.
pub struct LlmFactory;

impl LlmFactory {
    /// Create an LLM provider from the given configuration.
    pub fn create(provider: LlmProvider, config: LlmConfig) -> TemporaResult<Arc<dyn Llm>> {
        let llm: Arc<dyn Llm> = match provider {
            LlmProvider::OpenAI => Arc::new(OpenAIProvider::new(config)?),
            LlmProvider::Ollama => Arc::new(OllamaLlm::new(config)?),
            LlmProvider::Gemini => Arc::new(GeminiLlm::new(config)?),
        };
        info!("Using {:?} model {}", provider, llm.model_name());
        Ok(llm)
    }

    /// Create the provider named in a loaded configuration.
    pub fn from_config(config: &LlmProviderConfig) -> TemporaResult<Arc<dyn Llm>> {
        Self::create(config.provider, config.config.clone())
    }

    /// Create an OpenAI LLM provider with default configuration.
    pub fn openai() -> TemporaResult<Arc<dyn Llm>> {
        Self::create(LlmProvider::OpenAI, LlmConfig::default())
    }

    /// Create an OpenAI LLM provider with a specific model.
    pub fn openai_with_model(model: impl Into<String>) -> TemporaResult<Arc<dyn Llm>> {
        Self::with_model(LlmProvider::OpenAI, model)
    }

    /// Create an Ollama LLM provider with default configuration.
    pub fn ollama() -> TemporaResult<Arc<dyn Llm>> {
        Self::create(LlmProvider::Ollama, LlmConfig::default())
    }

    /// Create an Ollama LLM provider with a specific model.
    pub fn ollama_with_model(model: impl Into<String>) -> TemporaResult<Arc<dyn Llm>> {
        Self::with_model(LlmProvider::Ollama, model)
    }

    /// Create a Gemini LLM provider with a specific model.
    pub fn gemini_with_model(model: impl Into<String>) -> TemporaResult<Arc<dyn Llm>> {
        Self::with_model(LlmProvider::Gemini, model)
    }

    fn with_model(provider: LlmProvider, model: impl Into<String>) -> TemporaResult<Arc<dyn Llm>> {
        let config = LlmConfig {
            model: model.into(),
            ..Default::default()
        };
        Self::create(provider, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_builds_named_provider() {
        let config = LlmProviderConfig {
            provider: LlmProvider::Gemini,
            config: LlmConfig {
                model: "gemini-1.5-pro".to_string(),
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
        };
        let llm = LlmFactory::from_config(&config).unwrap();
        assert_eq!(llm.model_name(), "gemini-1.5-pro");
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let llm = LlmFactory::ollama_with_model("qwen2.5:14b").unwrap();
        assert_eq!(llm.model_name(), "qwen2.5:14b");
    }
}
