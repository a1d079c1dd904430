//! Batch ingestion: chunk storage, extraction and resolution.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::TemporaConfig;
use crate::error::TemporaResult;
use crate::extraction::Extractor;
use crate::resolution::{EntityResolver, LlmSummarizer, ResolutionReport};
use crate::traits::{GraphStore, Llm};
use crate::types::{DocumentChunk, StoredChunk};

/// A chunk that could not be ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub error: String,
    /// Error code such as `LLM_003`.
    pub code: String,
    pub suggestion: Option<String>,
}

/// Summary of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub chunks_total: usize,
    pub chunks_ingested: usize,
    pub failures: Vec<ChunkFailure>,
    /// Malformed or unrecognized records dropped by the parser.
    pub anomalies: usize,
    /// Relationships kept with a defaulted strength.
    pub strength_defaulted: usize,
    pub resolution: ResolutionReport,
}

struct ChunkResult {
    anomalies: usize,
    strength_defaulted: usize,
    resolution: ResolutionReport,
}

/// Runs extraction and resolution over batches of chunks.
///
/// Chunks are extracted concurrently up to the configured limit. A failing
/// chunk is reported and does not stop the batch.
pub struct IngestPipeline {
    store: Arc<dyn GraphStore>,
    extractor: Extractor,
    resolver: EntityResolver,
    concurrency: usize,
}

impl IngestPipeline {
    /// Build a pipeline whose extraction and summarization use `llm`.
    pub fn new(llm: Arc<dyn Llm>, store: Arc<dyn GraphStore>, config: &TemporaConfig) -> Self {
        let extractor = Extractor::new(llm.clone(), config.extraction.clone(), config.retry.clone());
        let summarizer = LlmSummarizer::new(llm, config.extraction.language.clone());
        let resolver = EntityResolver::new(store.clone(), config.resolver.clone())
            .with_summarizer(Arc::new(summarizer));
        Self::from_parts(store, extractor, resolver, config.ingest_concurrency)
    }

    pub fn from_parts(
        store: Arc<dyn GraphStore>,
        extractor: Extractor,
        resolver: EntityResolver,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            extractor,
            resolver,
            concurrency: concurrency.max(1),
        }
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Ingest a batch of chunks.
    pub async fn ingest(&self, chunks: Vec<DocumentChunk>) -> IngestReport {
        let mut report = IngestReport {
            chunks_total: chunks.len(),
            ..Default::default()
        };
        info!("Ingesting {} chunks", chunks.len());

        let results: Vec<(String, TemporaResult<ChunkResult>)> = stream::iter(chunks)
            .map(|chunk| async move {
                let chunk_id = chunk.chunk_id();
                let result = self.ingest_chunk(&chunk).await;
                (chunk_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (chunk_id, result) in results {
            match result {
                Ok(done) => {
                    report.chunks_ingested += 1;
                    report.anomalies += done.anomalies;
                    report.strength_defaulted += done.strength_defaulted;
                    report.resolution.absorb(done.resolution);
                }
                Err(e) => {
                    let suggestion = e.suggestion().map(str::to_string);
                    warn!(
                        "Failed to ingest chunk {}: {} ({})",
                        chunk_id,
                        e,
                        suggestion.as_deref().unwrap_or("no suggestion")
                    );
                    report.failures.push(ChunkFailure {
                        chunk_id,
                        error: e.to_string(),
                        code: e.code().as_str().to_string(),
                        suggestion,
                    });
                }
            }
        }

        info!(
            "Ingested {}/{} chunks: {} entities created, {} updated, {} relationships added, {} anomalies",
            report.chunks_ingested,
            report.chunks_total,
            report.resolution.entities_created,
            report.resolution.entities_updated,
            report.resolution.relationships_added,
            report.anomalies
        );
        report
    }

    /// Ingest bare text as a single chunk.
    pub async fn ingest_text(&self, text: &str) -> IngestReport {
        self.ingest(vec![DocumentChunk::from_text(text)]).await
    }

    async fn ingest_chunk(&self, chunk: &DocumentChunk) -> TemporaResult<ChunkResult> {
        let ingested_at = Utc::now();
        self.store
            .insert_chunk(StoredChunk::from_document(chunk, ingested_at))
            .await?;
        let extraction = self.extractor.extract_chunk(chunk, ingested_at).await?;
        let resolution = self.resolver.resolve(&extraction).await?;
        Ok(ChunkResult {
            anomalies: extraction.outcome.anomalies.len(),
            strength_defaulted: extraction.outcome.strength_defaulted,
            resolution,
        })
    }
}
