//! Orchestration of ingestion and query answering.

mod ingest;
mod query;

pub use ingest::{ChunkFailure, IngestPipeline, IngestReport};
pub use query::{QueryEngine, QueryOptions, QueryOutcome};
