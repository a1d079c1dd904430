//! Entity resolution: name policy, chronological merging and the resolver.

mod locks;
mod name;
mod resolver;
mod summarize;

pub use locks::{KeyedLocks, MonotonicClock};
pub use name::NamePolicy;
pub use resolver::{
    relationship_fingerprint, EntityResolver, MergeFailure, ResolutionReport, UNKNOWN_ENTITY_TYPE,
};
pub use summarize::{
    chronological_order, degraded_merge, join_descriptions, ordered_texts, validate_summary,
    LlmSummarizer, Summarizer, MERGE_UNAVAILABLE_MARKER,
};
