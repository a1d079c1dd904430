//! Extraction passes over one chunk, including continuation ("gleaning").

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::grammar::RecordParser;
use super::prompts::{
    continue_extraction_prompt, entity_extraction_prompt, loop_check_prompt, LOOP_CONTINUE,
};
use super::records::ParseOutcome;
use crate::config::ExtractionConfig;
use crate::error::TemporaResult;
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::Llm;
use crate::types::{DocumentChunk, Message};

/// Everything extracted from one chunk, ready for resolution.
#[derive(Debug, Clone)]
pub struct ChunkExtraction {
    /// Stable chunk identifier.
    pub source_id: String,
    /// URL of the originating document, when known.
    pub file_path: Option<String>,
    /// Source time of the chunk: publication, or ingestion when unknown.
    pub acquired_at: DateTime<Utc>,
    /// When the chunk entered the pipeline.
    pub ingested_at: DateTime<Utc>,
    pub outcome: ParseOutcome,
}

/// Runs the extraction prompt set against an [`Llm`].
pub struct Extractor {
    llm: Arc<dyn Llm>,
    config: ExtractionConfig,
    parser: RecordParser,
    retry: RetryPolicy,
}

impl Extractor {
    /// Create a new extractor.
    pub fn new(llm: Arc<dyn Llm>, config: ExtractionConfig, retry: RetryPolicy) -> Self {
        let parser = RecordParser::new(&config);
        Self {
            llm,
            config,
            parser,
            retry,
        }
    }

    /// Extraction settings.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract records from a document chunk.
    pub async fn extract_chunk(
        &self,
        chunk: &DocumentChunk,
        ingested_at: DateTime<Utc>,
    ) -> TemporaResult<ChunkExtraction> {
        let outcome = self.extract_text(&chunk.render()).await?;
        Ok(ChunkExtraction {
            source_id: chunk.chunk_id(),
            file_path: chunk.url.clone().filter(|u| !u.trim().is_empty()),
            acquired_at: chunk.acquired_at(ingested_at),
            ingested_at,
            outcome,
        })
    }

    /// Extract records from text.
    ///
    /// A failing first pass is an error for the chunk. A failing continuation
    /// pass or loop check ends gleaning and keeps what was recovered so far.
    pub async fn extract_text(&self, text: &str) -> TemporaResult<ParseOutcome> {
        let mut history = vec![Message::user(entity_extraction_prompt(&self.config, text))];
        let reply = self.call(&history, "extraction").await?;
        let mut outcome = self.parser.parse(&reply);
        history.push(Message::assistant(reply));

        for pass in 0..self.config.max_gleaning {
            history.push(Message::user(continue_extraction_prompt(&self.config)));
            let reply = match self.call(&history, "gleaning").await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Gleaning pass {} failed, keeping earlier records: {}", pass + 1, e);
                    break;
                }
            };
            let glean = self.parser.parse(&reply);
            debug!(
                "Gleaning pass {} recovered {} records",
                pass + 1,
                glean.records.len()
            );
            outcome.extend(glean);
            history.push(Message::assistant(reply));

            if pass + 1 == self.config.max_gleaning {
                break;
            }

            let mut check = history.clone();
            check.push(Message::user(loop_check_prompt()));
            match self.call(&check, "loop check").await {
                Ok(answer) if is_continue(&answer) => {}
                Ok(_) => break,
                Err(e) => {
                    warn!("Loop check failed, stopping gleaning: {}", e);
                    break;
                }
            }
        }

        if !outcome.anomalies.is_empty() {
            warn!(
                "Extraction dropped {} malformed records",
                outcome.anomalies.len()
            );
        }
        Ok(outcome)
    }

    async fn call(&self, messages: &[Message], operation: &str) -> TemporaResult<String> {
        with_retry(&self.retry, operation, || self.llm.complete(messages, None)).await
    }
}

fn is_continue(answer: &str) -> bool {
    answer
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '.')
        .eq_ignore_ascii_case(LOOP_CONTINUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemporaError;
    use crate::test_support::ScriptedLlm;

    const FIRST: &str = r#"("entity"<|>"Tokyo"<|>"geo"<|>"Host city.")##("relationship"<|>"Noah Carter"<|>"Tokyo"<|>"Raced in Tokyo."<|>"competition"<|>8)<|COMPLETE|>"#;
    const SECOND: &str = r#"("entity"<|>"Noah Carter"<|>"person"<|>"Sprinter.")<|COMPLETE|>"#;

    fn extractor(llm: Arc<ScriptedLlm>, max_gleaning: usize) -> Extractor {
        let config = ExtractionConfig {
            max_gleaning,
            ..Default::default()
        };
        Extractor::new(llm, config, RetryPolicy::no_retry())
    }

    #[tokio::test]
    async fn test_single_pass_without_gleaning() {
        let llm = Arc::new(ScriptedLlm::new([FIRST]));
        let outcome = extractor(llm.clone(), 0).extract_text("text").await.unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_gleaning_merges_passes() {
        let llm = Arc::new(ScriptedLlm::new([FIRST, SECOND]));
        let outcome = extractor(llm.clone(), 1).extract_text("text").await.unwrap();
        assert_eq!(outcome.entities().count(), 2);
        // One gleaning pass, no loop check after the last allowed pass.
        assert_eq!(llm.call_count(), 2);
        assert!(llm.prompt(1).starts_with("MANY entities"));
    }

    #[tokio::test]
    async fn test_loop_check_stops_on_no() {
        let llm = Arc::new(ScriptedLlm::new([FIRST, SECOND, "NO"]));
        let outcome = extractor(llm.clone(), 3).extract_text("text").await.unwrap();
        assert_eq!(outcome.entities().count(), 2);
        assert_eq!(llm.call_count(), 3);
        assert!(llm.prompt(2).contains("Answer ONLY by `YES` OR `NO`"));
    }

    #[tokio::test]
    async fn test_loop_check_continues_on_yes() {
        let llm = Arc::new(ScriptedLlm::new([FIRST, SECOND, "\"yes\"", SECOND]));
        let outcome = extractor(llm.clone(), 2).extract_text("text").await.unwrap();
        assert_eq!(outcome.entities().count(), 3);
        assert_eq!(llm.call_count(), 4);
    }

    #[tokio::test]
    async fn test_first_pass_failure_is_error() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()).then_error(
            TemporaError::llm_invalid_response("bad gateway"),
        ));
        assert!(extractor(llm, 1).extract_text("text").await.is_err());
    }

    #[tokio::test]
    async fn test_gleaning_failure_keeps_first_pass() {
        let llm = Arc::new(
            ScriptedLlm::new([FIRST]).then_error(TemporaError::llm_invalid_response("empty")),
        );
        let outcome = extractor(llm, 1).extract_text("text").await.unwrap();
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn test_extract_chunk_carries_provenance() {
        let llm = Arc::new(ScriptedLlm::new([FIRST]));
        let chunk = DocumentChunk::from_text("Noah Carter raced in Tokyo.")
            .with_published_at("2024-07-29T08:00:00Z")
            .with_url("https://news.example/a");
        let extraction = extractor(llm.clone(), 0)
            .extract_chunk(&chunk, Utc::now())
            .await
            .unwrap();
        assert_eq!(extraction.source_id, chunk.chunk_id());
        assert_eq!(extraction.file_path.as_deref(), Some("https://news.example/a"));
        assert_eq!(extraction.acquired_at, chunk.published_time().unwrap());
        assert!(llm.prompt(0).contains("Chunk Text: Noah Carter raced in Tokyo."));
    }
}
