//! tempora-llm - LLM provider implementations for tempora.
//!
//! Every provider implements [`tempora_core::traits::Llm`], which the
//! extractor, summarizer, keyword tiering and synthesizer all share.
//!
//! # Supported Providers
//!
//! - **OpenAI** (feature: `openai`) - GPT-4o and compatible endpoints
//! - **Gemini** - Google Gemini over REST, always available
//! - **Ollama** (feature: `ollama`) - Local models via Ollama
//!
//! # Example
//!
//! ```ignore
//! use tempora_llm::LlmFactory;
//!
//! let llm = LlmFactory::openai_with_model("gpt-4o-mini")?;
//! let local = LlmFactory::ollama_with_model("llama3.1:8b")?;
//! ```

mod factory;
mod gemini;
mod ollama;
mod openai;

pub use factory::LlmFactory;
pub use gemini::GeminiLlm;
pub use ollama::OllamaLlm;
pub use openai::OpenAIProvider;

// Re-export core types for convenience
pub use tempora_core::config::{LlmProvider, LlmProviderConfig};
pub use tempora_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse, ResponseFormat};
