//! Description ordering and the summarization seam.

use async_trait::async_trait;
use std::cmp::Reverse;
use std::sync::Arc;

use crate::error::{TemporaError, TemporaResult};
use crate::extraction::prompts::{summarize_descriptions_prompt, FAIL_RESPONSE};
use crate::temporal::{earliest_marker, extract_markers};
use crate::traits::Llm;
use crate::types::{DescriptionEntry, Message};

/// Prefix of a description produced without the summarizer.
pub const MERGE_UNAVAILABLE_MARKER: &str = "[automatic merge unavailable]";

const REFUSAL_PREFIXES: [&str; 5] = [
    "i'm sorry",
    "i am sorry",
    "i cannot",
    "i can't",
    "as an ai",
];

/// Merges several descriptions of one entity into one.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `descriptions`, given in chronological order.
    async fn summarize(&self, entity_name: &str, descriptions: &[String]) -> TemporaResult<String>;
}

/// [`Summarizer`] backed by an [`Llm`] and the description summary prompt.
pub struct LlmSummarizer {
    llm: Arc<dyn Llm>,
    language: String,
}

impl LlmSummarizer {
    /// Create a new summarizer answering in `language`.
    pub fn new(llm: Arc<dyn Llm>, language: impl Into<String>) -> Self {
        Self {
            llm,
            language: language.into(),
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, entity_name: &str, descriptions: &[String]) -> TemporaResult<String> {
        let prompt = summarize_descriptions_prompt(&self.language, entity_name, descriptions);
        let reply = self.llm.complete(&[Message::user(prompt)], None).await?;
        validate_summary(&reply)
    }
}

/// Reject blank, refusal or no-context replies.
pub fn validate_summary(reply: &str) -> TemporaResult<String> {
    let text = reply.trim();
    if text.is_empty() {
        return Err(TemporaError::llm_invalid_response("empty summary"));
    }
    let lower = text.to_lowercase();
    if text.contains(FAIL_RESPONSE) || text.contains("[no-context]") {
        return Err(TemporaError::llm_invalid_response("summary is a no-context reply"));
    }
    if REFUSAL_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Err(TemporaError::llm_invalid_response("summary is a refusal"));
    }
    Ok(text.to_string())
}

/// Order descriptions chronologically.
///
/// Dated descriptions come first, by the start of their earliest temporal
/// marker; on the same start the more specific marker wins (day, month,
/// quarter, year), then the earlier acquisition. Undated descriptions follow
/// in their original order.
pub fn chronological_order(entries: &[DescriptionEntry]) -> Vec<&DescriptionEntry> {
    let mut keyed: Vec<_> = entries
        .iter()
        .map(|e| (earliest_marker(&e.text), e))
        .collect();
    keyed.sort_by(|(ma, a), (mb, b)| match (ma, mb) {
        (Some(x), Some(y)) => (x.start, Reverse(x.precision), a.acquired_at)
            .cmp(&(y.start, Reverse(y.precision), b.acquired_at)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    keyed.into_iter().map(|(_, e)| e).collect()
}

const ACCOUNT_STOPWORDS: &[&str] = &[
    "a", "an", "the", "in", "on", "at", "of", "by", "during", "around", "since", "and", "was",
    "were", "is", "it", "its", "year",
];

/// Words of an account with its dates, numbers and filler removed.
fn account_words(text: &str) -> Vec<String> {
    let mut undated = text.to_string();
    for marker in extract_markers(text).iter().rev() {
        undated.replace_range(marker.offset..marker.offset + marker.text.len(), " ");
    }
    undated
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| {
            !w.is_empty()
                && !ACCOUNT_STOPWORDS.contains(w)
                && !w.chars().all(|c| c.is_ascii_digit())
        })
        .map(str::to_string)
        .collect()
}

/// Whether `fine` is a more precisely dated telling of `coarse`: its period
/// lies inside the coarser one and `coarse` says nothing else.
fn refines(fine: &str, coarse: &str) -> bool {
    let (Some(f), Some(c)) = (earliest_marker(fine), earliest_marker(coarse)) else {
        return false;
    };
    if f.precision <= c.precision || f.start < c.start || f.end > c.end {
        return false;
    }
    let fine_words = account_words(fine);
    let coarse_words = account_words(coarse);
    !coarse_words.is_empty() && coarse_words.iter().all(|w| fine_words.contains(w))
}

/// Distinct description texts in chronological order.
///
/// An account whose date is refined by a more specific account of the same
/// event ("Founded in 1999." against "Founded on March 3, 1999.") is left out.
pub fn ordered_texts(entries: &[DescriptionEntry]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in chronological_order(entries) {
        let text = entry.text.trim();
        if !text.is_empty() && !out.iter().any(|t| t == text) {
            out.push(text.to_string());
        }
    }
    let refined: Vec<bool> = out
        .iter()
        .map(|coarse| out.iter().any(|fine| refines(fine, coarse)))
        .collect();
    out.into_iter()
        .zip(refined)
        .filter_map(|(text, refined)| (!refined).then_some(text))
        .collect()
}

/// Deterministic merge: texts joined by a space.
pub fn join_descriptions(texts: &[String]) -> String {
    texts
        .iter()
        .map(|t| {
            let t = t.trim();
            if t.ends_with(['.', '!', '?']) {
                t.to_string()
            } else {
                format!("{}.", t)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merge used when summarization is unavailable.
pub fn degraded_merge(texts: &[String]) -> String {
    format!("{} {}", MERGE_UNAVAILABLE_MARKER, join_descriptions(texts))
}
