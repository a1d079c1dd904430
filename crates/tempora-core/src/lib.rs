//! tempora-core - temporal knowledge graph construction and answering.
//!
//! Extraction output is parsed into candidate records, merged into a
//! canonical graph by the entity resolver, and queried through tiered
//! keywords and a conflict-aware synthesizer.
//!
//! # Example
//!
//! ```ignore
//! use tempora_core::{IngestPipeline, QueryEngine, TemporaConfig};
//!
//! let config = TemporaConfig::from_env()?;
//! let pipeline = IngestPipeline::new(llm.clone(), store.clone(), &config);
//! pipeline.ingest(chunks).await;
//!
//! let engine = QueryEngine::new(llm, store, &config);
//! let outcome = engine.query("When did Noah Carter set the record?", &[]).await?;
//! println!("{}", outcome.answer.text());
//! ```

pub mod config;
pub mod error;
pub mod extraction;
pub mod pipeline;
pub mod query;
pub mod resolution;
pub mod retry;
pub mod synthesis;
pub mod temporal;
pub mod traits;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{
    ExtractionConfig, LlmProvider, LlmProviderConfig, QueryConfig, ResolverConfig, TemporaConfig,
};
pub use error::{ErrorCode, TemporaError, TemporaResult};
pub use extraction::{ChunkExtraction, Extractor, ParseOutcome, RecordParser};
pub use pipeline::{IngestPipeline, IngestReport, QueryEngine, QueryOptions, QueryOutcome};
pub use query::KeywordTiering;
pub use resolution::{EntityResolver, NamePolicy, ResolutionReport, Summarizer};
pub use retry::RetryPolicy;
pub use synthesis::{Answer, ConflictPolicy, Synthesizer};
pub use traits::{GraphStore, GraphStoreConfig, GraphStoreProvider, Llm, LlmConfig};
pub use types::{
    DocumentChunk, Entity, GraphSnapshot, Message, MessageRole, QueryKeywords, QueryMode,
    QueryParams, Relationship, ResponseType, RetrievedContext, StoredChunk,
};
