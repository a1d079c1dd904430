//! Ollama LLM provider implementation.

use async_trait::async_trait;

use tempora_core::error::{TemporaError, TemporaResult};
use tempora_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse};
use tempora_core::types::Message;

#[cfg(feature = "ollama")]
use tempora_core::traits::ResponseFormat;
#[cfg(feature = "ollama")]
use tempora_core::types::MessageRole;

#[cfg(feature = "ollama")]
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage, MessageRole as OllamaRole},
    Ollama,
};

const DEFAULT_URL: &str = "http://localhost:11434";
const DEFAULT_PORT: u16 = 11434;
const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Ollama LLM provider.
pub struct OllamaLlm {
    #[cfg(feature = "ollama")]
    client: Ollama,
    host: String,
    port: u16,
    config: LlmConfig,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider.
    pub fn new(config: LlmConfig) -> TemporaResult<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_URL);
        let url = url::Url::parse(base_url)
            .map_err(|e| TemporaError::Configuration(format!("Invalid Ollama URL: {}", e)))?;

        let host = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or("localhost")
        );
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            #[cfg(feature = "ollama")]
            client: Ollama::new(host.clone(), port),
            host,
            port,
            config,
        })
    }

    /// Host and port the client talks to.
    pub fn endpoint(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    #[cfg(feature = "ollama")]
    fn message_to_ollama(msg: &Message) -> ChatMessage {
        let role = match msg.role {
            MessageRole::System => OllamaRole::System,
            MessageRole::User => OllamaRole::User,
            MessageRole::Assistant => OllamaRole::Assistant,
        };
        ChatMessage::new(role, msg.content.clone())
    }
}

#[async_trait]
impl Llm for OllamaLlm {
    #[cfg(feature = "ollama")]
    async fn generate(
        &self,
        messages: &[Message],
        options: Option<GenerationOptions>,
    ) -> TemporaResult<LlmResponse> {
        let options = options.unwrap_or_default();

        let mut ollama_messages: Vec<ChatMessage> =
            messages.iter().map(Self::message_to_ollama).collect();

        // Plain prompting is the only JSON control the chat endpoint gives us here.
        if options.response_format == Some(ResponseFormat::Json) {
            if let Some(last) = ollama_messages.last_mut() {
                last.content.push_str("\n\nRespond with valid JSON only.");
            }
        }

        let request = ChatMessageRequest::new(self.config.model.clone(), ollama_messages);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| TemporaError::llm(format!("Ollama API error: {}", e)))?;

        Ok(LlmResponse {
            content: response.message.map(|m| m.content),
            usage: None,
        })
    }

    #[cfg(not(feature = "ollama"))]
    async fn generate(
        &self,
        _messages: &[Message],
        _options: Option<GenerationOptions>,
    ) -> TemporaResult<LlmResponse> {
        Err(TemporaError::Configuration(
            "Ollama feature not enabled. Enable the 'ollama' feature.".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn supports_json_mode(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults_to_local_daemon() {
        let llm = OllamaLlm::new(LlmConfig::default()).unwrap();
        assert_eq!(llm.endpoint(), ("http://localhost", 11434));
        assert_eq!(llm.model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_custom_base_url_is_split() {
        let llm = OllamaLlm::new(LlmConfig {
            base_url: Some("https://gpu-box.internal:8443".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(llm.endpoint(), ("https://gpu-box.internal", 8443));
    }

    #[test]
    fn test_invalid_base_url_is_configuration_error() {
        let result = OllamaLlm::new(LlmConfig {
            base_url: Some("not a url".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(TemporaError::Configuration(_))));
    }
}
