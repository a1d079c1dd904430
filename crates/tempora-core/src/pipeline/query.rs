//! Query answering: keyword tiering, retrieval and synthesis.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{QueryConfig, TemporaConfig};
use crate::error::TemporaResult;
use crate::query::KeywordTiering;
use crate::synthesis::{Answer, SynthesisRequest, Synthesizer};
use crate::traits::{GraphStore, Llm};
use crate::types::{Message, QueryKeywords, QueryMode, QueryParams, ResponseType, RetrievedContext};

/// Per-query overrides of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub mode: Option<QueryMode>,
    pub response_type: Option<ResponseType>,
    pub top_k: Option<usize>,
    /// Extra instruction passed to the composition model.
    pub user_prompt: Option<String>,
}

/// Everything produced while answering one query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub keywords: QueryKeywords,
    pub context: RetrievedContext,
    pub answer: Answer,
}

/// Answers queries against a graph store. Holds no per-query state.
pub struct QueryEngine {
    tiering: KeywordTiering,
    store: Arc<dyn GraphStore>,
    synthesizer: Synthesizer,
    config: QueryConfig,
}

impl QueryEngine {
    /// Build an engine that classifies and composes with `llm`.
    pub fn new(llm: Arc<dyn Llm>, store: Arc<dyn GraphStore>, config: &TemporaConfig) -> Self {
        let tiering = KeywordTiering::new(llm.clone(), config.retry.clone())
            .with_history_turns(config.query.history_turns);
        let synthesizer = Synthesizer::new(&config.query)
            .with_name_policy(config.resolver.name_policy)
            .with_llm(llm, config.retry.clone());
        Self::from_parts(tiering, store, synthesizer, config.query.clone())
    }

    pub fn from_parts(
        tiering: KeywordTiering,
        store: Arc<dyn GraphStore>,
        synthesizer: Synthesizer,
        config: QueryConfig,
    ) -> Self {
        Self {
            tiering,
            store,
            synthesizer,
            config,
        }
    }

    /// Answer with the configured mode and response type.
    pub async fn query(&self, query: &str, history: &[Message]) -> TemporaResult<QueryOutcome> {
        self.query_with(query, history, &QueryOptions::default()).await
    }

    /// Answer with per-query overrides.
    ///
    /// Classification failures are errors. Empty retrieval yields
    /// [`Answer::NoContext`].
    pub async fn query_with(
        &self,
        query: &str,
        history: &[Message],
        options: &QueryOptions,
    ) -> TemporaResult<QueryOutcome> {
        let keywords = self.tiering.classify(query, history).await?;
        let params = QueryParams {
            mode: options.mode.unwrap_or(self.config.mode),
            top_k: options.top_k.unwrap_or(self.config.top_k).max(1),
        };

        if keywords.is_empty() {
            warn!("No keywords found for query, nothing to retrieve");
            return Ok(QueryOutcome {
                keywords,
                context: RetrievedContext::default(),
                answer: Answer::NoContext,
            });
        }

        let context = self.store.retrieve(&keywords, &params).await?;
        info!(
            "Retrieved {} entities, {} relationships, {} chunks ({} mode)",
            context.entities.len(),
            context.relationships.len(),
            context.chunks.len(),
            params.mode
        );

        let request = SynthesisRequest {
            query,
            keywords: &keywords,
            context: &context,
            history,
            response_type: options.response_type.unwrap_or(self.config.response_type),
            mode: params.mode,
            user_prompt: options.user_prompt.as_deref(),
        };
        let answer = self.synthesizer.synthesize(&request).await;
        Ok(QueryOutcome {
            keywords,
            context,
            answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::retry::RetryPolicy;
    use crate::test_support::{MemoryStore, ScriptedLlm};
    use crate::types::{DocumentChunk, StoredChunk};
    use chrono::Utc;

    fn engine(llm: Arc<ScriptedLlm>, store: Arc<MemoryStore>) -> QueryEngine {
        let config = QueryConfig::default();
        let tiering = KeywordTiering::new(llm, RetryPolicy::no_retry());
        QueryEngine::from_parts(tiering, store, Synthesizer::new(&config), config)
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_is_shareable() {
        assert_send_sync::<QueryEngine>();
    }

    #[tokio::test]
    async fn test_query_answers_from_chunks() {
        let store = Arc::new(MemoryStore::default());
        let chunk = DocumentChunk::from_text("Noah Carter set the record on July 28, 2024.")
            .with_url("https://news.example/record");
        store
            .insert_chunk(StoredChunk::from_document(&chunk, Utc::now()))
            .await
            .unwrap();
        let llm = Arc::new(ScriptedLlm::always(
            r#"{"high_level_keywords": ["records"], "low_level_keywords": ["Noah Carter"], "temporal_keywords": ["2024"]}"#,
        ));

        let outcome = engine(llm, store)
            .query_with(
                "When did Noah Carter set the record?",
                &[],
                &QueryOptions {
                    mode: Some(QueryMode::Naive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.context.chunks.len(), 1);
        assert!(outcome.answer.text().contains("July 28, 2024"));
        assert!(outcome.answer.text().ends_with("[DC] https://news.example/record"));
    }

    #[tokio::test]
    async fn test_empty_store_gives_no_context() {
        let llm = Arc::new(ScriptedLlm::always(
            r#"{"high_level_keywords": [], "low_level_keywords": ["Atlantis"], "temporal_keywords": []}"#,
        ));
        let outcome = engine(llm, Arc::new(MemoryStore::default()))
            .query("Where is Atlantis?", &[])
            .await
            .unwrap();
        assert!(outcome.answer.is_no_context());
    }

    #[tokio::test]
    async fn test_classification_failure_is_error() {
        let llm = Arc::new(ScriptedLlm::always("no idea"));
        let err = engine(llm, Arc::new(MemoryStore::default()))
            .query("Who won?", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ClsInvalidStructure);
    }
}
