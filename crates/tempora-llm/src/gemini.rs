//! Google Gemini provider over the `generateContent` REST endpoint.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tempora_core::error::{TemporaError, TemporaResult};
use tempora_core::traits::{
    GenerationOptions, Llm, LlmConfig, LlmResponse, ResponseFormat, TokenUsage,
};
use tempora_core::types::{Message, MessageRole};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini LLM provider.
pub struct GeminiLlm {
    client: Client,
    api_key: SecretString,
    config: LlmConfig,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

impl GeminiLlm {
    /// Create a provider, reading `GEMINI_API_KEY` when the config has no key.
    pub fn new(config: LlmConfig) -> TemporaResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| {
                TemporaError::Configuration(
                    "Gemini API key not found. Set GEMINI_API_KEY or provide api_key in config."
                        .to_string(),
                )
            })?;

        let client = Client::builder().build().map_err(|e| {
            TemporaError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| GEMINI_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            client,
            api_key: SecretString::new(api_key),
            config,
            base_url,
        })
    }

    fn build_request(&self, messages: &[Message], options: &GenerationOptions) -> GeminiRequest {
        let system: Vec<GeminiPart> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| GeminiPart {
                text: m.content.clone(),
            })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        MessageRole::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| GeminiContent {
                role: None,
                parts: system,
            }),
            generation_config: GeminiGenerationConfig {
                temperature: options.temperature.unwrap_or(self.config.temperature),
                top_p: options.top_p.unwrap_or(self.config.top_p),
                max_output_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
                response_mime_type: (options.response_format == Some(ResponseFormat::Json))
                    .then_some("application/json"),
            },
        }
    }
}

/// Concatenate the text parts of the first candidate.
fn first_candidate_text(response: &GeminiResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl Llm for GeminiLlm {
    async fn generate(
        &self,
        messages: &[Message],
        options: Option<GenerationOptions>,
    ) -> TemporaResult<LlmResponse> {
        let options = options.unwrap_or_default();
        let request = self.build_request(messages, &options);
        debug!("Gemini request to {} with {} turns", self.config.model, request.contents.len());

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.config.model
            ))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| TemporaError::llm(format!("Gemini API request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TemporaError::llm(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(TemporaError::from_http_status(status.as_u16(), &message));
        }

        let response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            TemporaError::llm_invalid_response(format!("Failed to parse response: {}", e))
        })?;

        let usage = response.usage_metadata.as_ref().map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(LlmResponse {
            content: first_candidate_text(&response),
            usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn supports_json_mode(&self) -> bool {
        true
    }
}
