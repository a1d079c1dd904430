//! OpenAI chat completions provider.

use async_trait::async_trait;

use tempora_core::error::{TemporaError, TemporaResult};
use tempora_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse, ResponseFormat};
use tempora_core::types::Message;

#[cfg(feature = "openai")]
use tempora_core::traits::TokenUsage;
#[cfg(feature = "openai")]
use tempora_core::types::MessageRole;

#[cfg(feature = "openai")]
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
        ResponseFormat as OpenAIResponseFormat,
    },
    Client,
};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI LLM provider.
pub struct OpenAIProvider {
    #[cfg(feature = "openai")]
    client: Client<OpenAIConfig>,
    config: LlmConfig,
}

impl OpenAIProvider {
    /// Create a provider, reading `OPENAI_API_KEY` when the config has no key.
    pub fn new(config: LlmConfig) -> TemporaResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                TemporaError::Configuration(
                    "OpenAI API key not found. Set OPENAI_API_KEY or provide api_key in config."
                        .to_string(),
                )
            })?;

        #[cfg(feature = "openai")]
        let client = {
            let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
            if let Some(ref base_url) = config.base_url {
                openai_config = openai_config.with_api_base(base_url);
            }
            Client::with_config(openai_config)
        };
        #[cfg(not(feature = "openai"))]
        let _ = api_key;

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            #[cfg(feature = "openai")]
            client,
            config,
        })
    }

    /// Reasoning models reject sampling parameters.
    fn is_reasoning_model(&self) -> bool {
        let model = self.config.model.to_lowercase();
        ["o1", "o3", "o4", "gpt-5"]
            .iter()
            .any(|prefix| model.starts_with(prefix))
    }

    #[cfg(feature = "openai")]
    fn message_to_openai(msg: &Message) -> ChatCompletionRequestMessage {
        let content = msg.content.clone();
        match msg.role {
            MessageRole::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(content),
                    name: None,
                })
            }
            MessageRole::User => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(content),
                    name: None,
                })
            }
            MessageRole::Assistant => {
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(content)),
                    ..Default::default()
                })
            }
        }
    }
}

#[async_trait]
impl Llm for OpenAIProvider {
    #[cfg(feature = "openai")]
    async fn generate(
        &self,
        messages: &[Message],
        options: Option<GenerationOptions>,
    ) -> TemporaResult<LlmResponse> {
        let options = options.unwrap_or_default();

        let mut request = CreateChatCompletionRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(Self::message_to_openai).collect(),
            ..Default::default()
        };

        if !self.is_reasoning_model() {
            request.temperature = Some(options.temperature.unwrap_or(self.config.temperature));
            request.top_p = Some(options.top_p.unwrap_or(self.config.top_p));
            request.max_tokens = Some(options.max_tokens.unwrap_or(self.config.max_tokens));
        }
        if options.response_format == Some(ResponseFormat::Json) {
            request.response_format = Some(OpenAIResponseFormat::JsonObject);
        }

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| TemporaError::llm(format!("OpenAI API error: {}", e)))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| TemporaError::llm_invalid_response("No response choices returned"))?;

        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content: choice.message.content.clone(),
            usage,
        })
    }

    #[cfg(not(feature = "openai"))]
    async fn generate(
        &self,
        _messages: &[Message],
        _options: Option<GenerationOptions>,
    ) -> TemporaResult<LlmResponse> {
        Err(TemporaError::Configuration(
            "OpenAI feature not enabled. Enable the 'openai' feature.".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn supports_json_mode(&self) -> bool {
        !self.is_reasoning_model() || self.config.model.starts_with("gpt-5")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(model: &str) -> OpenAIProvider {
        OpenAIProvider::new(LlmConfig {
            model: model.to_string(),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_model_is_filled_in() {
        assert_eq!(provider("").model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_reasoning_models_are_detected_by_prefix() {
        assert!(provider("o3-mini").is_reasoning_model());
        assert!(!provider("gpt-4o").is_reasoning_model());
        assert!(provider("gpt-4o").supports_json_mode());
    }
}
