//! Conflict-aware answer synthesis.

mod conflict;
mod evidence;
mod synthesizer;

pub use conflict::{query_timeframe, ConflictPolicy, Disagreement, Superseded, SupersededReason};
pub use evidence::{
    chunk_body, collect_evidence, Citation, CitationSource, EvidenceItem, EvidenceKind,
    RelationFacets, DOCUMENTS_THEME,
};
pub use synthesizer::{
    render_references, strip_model_references, Answer, SynthesisRequest, SynthesizedAnswer,
    Synthesizer, MAX_REFERENCES, REFERENCES_HEADING, TIMELINE_HEADING,
};
