//! Answer composition from retrieved evidence.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use super::conflict::{query_timeframe, ConflictPolicy, Superseded};
use super::evidence::{collect_evidence, Citation, EvidenceItem, EvidenceKind};
use crate::config::QueryConfig;
use crate::extraction::prompts::{naive_rag_response_prompt, rag_response_prompt, FAIL_RESPONSE};
use crate::resolution::{join_descriptions, NamePolicy};
use crate::retry::{with_retry, RetryPolicy};
use crate::temporal::{extract_markers, TemporalMarker};
use crate::traits::Llm;
use crate::types::{
    format_messages, Message, QueryKeywords, QueryMode, ResponseType, RetrievedContext,
};

/// Heading of the reference list.
pub const REFERENCES_HEADING: &str = "### References";
/// Heading of the dated section.
pub const TIMELINE_HEADING: &str = "### Timeline";
/// Most reference lines an answer carries.
pub const MAX_REFERENCES: usize = 5;

static MODEL_REFERENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:#+[ \t]*)?(?:\*\*)?[ \t]*(?:references?|sources)[ \t]*:?[ \t]*(?:\*\*)?[ \t]*:?[ \t]*$",
    )
    .unwrap()
});

static CAPITALIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\p{Lu}[\p{L}\p{N}'’-]*").unwrap());

/// Result of answering a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Nothing was retrieved.
    NoContext,
    Answered(SynthesizedAnswer),
}

impl Answer {
    /// Final text shown to the user.
    pub fn text(&self) -> &str {
        match self {
            Self::NoContext => FAIL_RESPONSE,
            Self::Answered(answer) => &answer.text,
        }
    }

    pub fn is_no_context(&self) -> bool {
        matches!(self, Self::NoContext)
    }
}

/// An answer built from evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAnswer {
    /// Body followed by the reference list.
    pub text: String,
    pub body: String,
    /// Reference lines in relevance order.
    pub references: Vec<Citation>,
    /// Contradicting facts left out of the answer.
    pub superseded: Vec<Superseded>,
    /// Whether the body was written by the composition model.
    pub composed: bool,
}

/// Everything needed to answer one query.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub query: &'a str,
    pub keywords: &'a QueryKeywords,
    pub context: &'a RetrievedContext,
    /// Prior turns, oldest first.
    pub history: &'a [Message],
    pub response_type: ResponseType,
    pub mode: QueryMode,
    pub user_prompt: Option<&'a str>,
}

/// Builds chronologically organized, cited answers.
///
/// Without a composition model the answer quotes evidence text only. With
/// one, its reply replaces the body when it is grounded in the kept
/// evidence: every date it names must fall within a dated evidence period
/// and every capitalized name inside a sentence must occur in evidence text.
pub struct Synthesizer {
    llm: Option<Arc<dyn Llm>>,
    retry: RetryPolicy,
    policy: ConflictPolicy,
    names: NamePolicy,
    max_references: usize,
    history_turns: usize,
}

impl Synthesizer {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            llm: None,
            retry: RetryPolicy::default(),
            policy: config.conflict.clone(),
            names: NamePolicy::default(),
            max_references: config.max_references.min(MAX_REFERENCES),
            history_turns: config.history_turns,
        }
    }

    /// Match relationship endpoints the way the resolver keyed them.
    pub fn with_name_policy(mut self, names: NamePolicy) -> Self {
        self.names = names;
        self
    }

    /// Attach a composition model.
    pub fn with_llm(mut self, llm: Arc<dyn Llm>, retry: RetryPolicy) -> Self {
        self.llm = Some(llm);
        self.retry = retry;
        self
    }

    pub async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Answer {
        let items = collect_evidence(request.context, request.mode, &self.names);
        if items.is_empty() {
            return Answer::NoContext;
        }

        let timeframe = query_timeframe(&request.keywords.temporal);
        let (items, superseded) = self.policy.resolve(items, &timeframe);
        if items.is_empty() {
            return Answer::NoContext;
        }
        if !superseded.is_empty() {
            debug!("Dropped {} contradicted facts", superseded.len());
        }

        let (body, cited) = compose(&items, request.response_type);
        let references = self.references(&cited);

        let (body, composed) = match self.compose_with_model(request, &items).await {
            Some(reply) => (reply, true),
            None => (body, false),
        };

        let text = format!("{}\n\n{}", body, render_references(&references));
        Answer::Answered(SynthesizedAnswer {
            text,
            body,
            references,
            superseded,
            composed,
        })
    }

    /// Distinct citations of the cited items, best rank first.
    fn references(&self, cited: &[&EvidenceItem]) -> Vec<Citation> {
        let mut by_rank: Vec<&EvidenceItem> = cited.to_vec();
        by_rank.sort_by_key(|item| item.rank);
        let mut out: Vec<Citation> = Vec::new();
        for item in by_rank {
            if out.len() == self.max_references {
                break;
            }
            if !out.contains(&item.citation) {
                out.push(item.citation.clone());
            }
        }
        out
    }

    async fn compose_with_model(
        &self,
        request: &SynthesisRequest<'_>,
        items: &[EvidenceItem],
    ) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let keep = self.history_turns.saturating_mul(2);
        let history = &request.history[request.history.len().saturating_sub(keep)..];
        let history = format_messages(history);
        let context = context_json(items, request);
        let prompt = if request.mode.uses_graph() {
            rag_response_prompt(&history, &context, request.response_type, request.user_prompt)
        } else {
            naive_rag_response_prompt(&history, &context, request.response_type, request.user_prompt)
        };
        let messages = [Message::system(prompt), Message::user(request.query)];

        match with_retry(&self.retry, "answer composition", || {
            llm.complete(&messages, None)
        })
        .await
        {
            Ok(reply) => {
                let body = strip_model_references(&reply);
                if body.is_empty() || body.contains(FAIL_RESPONSE) {
                    warn!("Composition model gave no usable answer, using evidence answer");
                    None
                } else if let Err(unsupported) = check_grounded(&body, items, request) {
                    warn!(
                        "Composed answer mentions '{}' absent from evidence, using evidence answer",
                        unsupported
                    );
                    None
                } else {
                    Some(body)
                }
            }
            Err(e) => {
                warn!("Answer composition failed, using evidence answer: {}", e);
                None
            }
        }
    }
}

/// Whether the capitalized word at `start` opens a sentence, line or heading.
fn opens_sentence(text: &str, start: usize) -> bool {
    let before = text[..start].trim_end_matches([' ', '\t', '*', '_', '"', '(', '>']);
    let line = before.rsplit('\n').next().unwrap_or("");
    line.trim_start_matches(['#', '-', '*', ' ', '\t']).trim().is_empty()
        || before.ends_with(['.', '!', '?', ':', ';'])
}

/// Check a composed body against the evidence it was given.
///
/// Returns the first date or name that no evidence item supports.
fn check_grounded(
    body: &str,
    items: &[EvidenceItem],
    request: &SynthesisRequest<'_>,
) -> Result<(), String> {
    let mut evidence = String::new();
    for item in items {
        evidence.push_str(&item.label);
        evidence.push('\n');
        evidence.push_str(&item.text);
        evidence.push('\n');
    }
    for sequence in &request.context.temporal_sequences {
        evidence.push_str(&sequence.name);
        evidence.push('\n');
        evidence.push_str(&sequence.entities.join(", "));
        evidence.push('\n');
        evidence.push_str(&sequence.description);
        evidence.push('\n');
    }
    let known_periods: Vec<TemporalMarker> = extract_markers(&evidence);
    let evidence = evidence.to_lowercase();

    for marker in extract_markers(body) {
        if !known_periods.iter().any(|k| marker.distance_days(k) == 0) {
            return Err(marker.text);
        }
    }
    for word in CAPITALIZED.find_iter(body) {
        if opens_sentence(body, word.start()) {
            continue;
        }
        let token = word.as_str().trim_end_matches(['\'', '’', '-']);
        let token = token
            .strip_suffix("'s")
            .or_else(|| token.strip_suffix("’s"))
            .unwrap_or(token);
        if token.chars().count() > 1 && !evidence.contains(&token.to_lowercase()) {
            return Err(token.to_string());
        }
    }
    Ok(())
}

/// The model's reply without its own references section.
pub fn strip_model_references(reply: &str) -> String {
    let reply = reply.trim();
    match MODEL_REFERENCES.find(reply) {
        Some(m) => reply[..m.start()].trim_end().to_string(),
        None => reply.to_string(),
    }
}

/// Reference list under its heading, one `[KG]` or `[DC]` line each.
pub fn render_references(references: &[Citation]) -> String {
    let mut out = String::from(REFERENCES_HEADING);
    out.push('\n');
    for citation in references {
        out.push('\n');
        out.push_str(&citation.to_string());
    }
    out
}

/// Dated items in chronological order and undated items grouped by theme.
fn arrange(items: &[EvidenceItem]) -> (Vec<&EvidenceItem>, Vec<(&str, Vec<&EvidenceItem>)>) {
    let mut timeline: Vec<&EvidenceItem> = items.iter().filter(|i| i.is_anchored()).collect();
    timeline.sort_by(|a, b| {
        let key = |i: &EvidenceItem| {
            i.marker
                .as_ref()
                .map(|m| m.chronological_key())
        };
        key(a)
            .cmp(&key(b))
            .then(a.created_at.cmp(&b.created_at))
            .then(a.rank.cmp(&b.rank))
    });

    let mut themes: Vec<(&str, Vec<&EvidenceItem>)> = Vec::new();
    for item in items.iter().filter(|i| !i.is_anchored()) {
        match themes.iter_mut().find(|(t, _)| *t == item.theme) {
            Some((_, group)) => group.push(item),
            None => themes.push((item.theme.as_str(), vec![item])),
        }
    }
    (timeline, themes)
}

fn texts(items: &[&EvidenceItem]) -> Vec<String> {
    items.iter().map(|i| i.text.clone()).collect()
}

/// The first sentence of `text`.
fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    let bytes = text.as_bytes();
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let next = bytes.get(i + 1);
            if next.map_or(true, |b| b.is_ascii_whitespace()) {
                return &text[..=i];
            }
        }
    }
    text
}

/// Evidence-only answer body and the items it quotes.
fn compose(items: &[EvidenceItem], response_type: ResponseType) -> (String, Vec<&EvidenceItem>) {
    if response_type == ResponseType::SingleLine {
        // Items arrive in rank order.
        return match items.first() {
            Some(top) => (first_sentence(&top.text).to_string(), vec![top]),
            None => (String::new(), Vec::new()),
        };
    }

    let (timeline, themes) = arrange(items);
    let mut ordered: Vec<&EvidenceItem> = timeline.clone();
    ordered.extend(themes.iter().flat_map(|(_, group)| group.iter().copied()));

    let body = match response_type {
        ResponseType::SingleParagraph => join_descriptions(&texts(&ordered)),
        ResponseType::Bullets => {
            let mut sections = Vec::new();
            if !timeline.is_empty() {
                sections.push(bullet_section(TIMELINE_HEADING, &timeline));
            }
            for (theme, group) in &themes {
                sections.push(bullet_section(&format!("### {}", theme), group));
            }
            sections.join("\n\n")
        }
        _ => {
            let mut sections = Vec::new();
            if !timeline.is_empty() {
                sections.push(format!(
                    "{}\n\n{}",
                    TIMELINE_HEADING,
                    join_descriptions(&texts(&timeline))
                ));
            }
            for (theme, group) in &themes {
                sections.push(format!("### {}\n\n{}", theme, join_descriptions(&texts(group))));
            }
            sections.join("\n\n")
        }
    };
    (body, ordered)
}

fn bullet_section(heading: &str, items: &[&EvidenceItem]) -> String {
    let lines: Vec<String> = texts(items).into_iter().map(|t| format!("- {}", t)).collect();
    format!("{}\n\n{}", heading, lines.join("\n"))
}

/// Kept evidence as the JSON context of the answer prompt.
fn context_json(items: &[EvidenceItem], request: &SynthesisRequest<'_>) -> String {
    let of_kind = |kind: EvidenceKind| items.iter().filter(move |i| i.kind == kind);
    let chunks: Vec<_> = of_kind(EvidenceKind::Chunk)
        .map(|i| {
            json!({
                "id": i.citation.id,
                "content": i.text,
                "created_at": i.created_at.to_rfc3339(),
            })
        })
        .collect();
    if !request.mode.uses_graph() {
        return json!({ "chunks": chunks }).to_string();
    }

    let entities: Vec<_> = of_kind(EvidenceKind::Entity)
        .map(|i| {
            json!({
                "entity": i.label,
                "type": i.theme,
                "description": i.text,
                "temporal_context": i.marker.as_ref().map(|m| m.text.clone()),
            })
        })
        .collect();
    let relationships: Vec<_> = of_kind(EvidenceKind::Relationship)
        .map(|i| {
            json!({
                "relationship": i.label,
                "description": i.text,
                "created_at": i.created_at.to_rfc3339(),
                "source": i.citation.id,
            })
        })
        .collect();
    let sequences: Vec<_> = request
        .context
        .temporal_sequences
        .iter()
        .map(|s| {
            json!({
                "sequence": s.name,
                "entities": s.entities,
                "description": s.description,
            })
        })
        .collect();
    json!({
        "entities": entities,
        "relationships": relationships,
        "temporal_sequences": sequences,
        "chunks": chunks,
    })
    .to_string()
}
