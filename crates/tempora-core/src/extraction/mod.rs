//! Record extraction: prompts, the delimited record grammar and gleaning.

mod extractor;
mod grammar;
pub mod prompts;
mod records;

pub use extractor::{ChunkExtraction, Extractor};
pub use grammar::{RecordParser, DEFAULT_STRENGTH};
pub use records::{
    AnomalyKind, CandidateRecord, EntityDraft, ParseAnomaly, ParseOutcome, RelationshipDraft,
    TemporalSequenceDraft,
};
