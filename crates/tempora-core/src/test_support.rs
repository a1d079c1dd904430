//! Scripted collaborators shared by unit tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::error::{TemporaError, TemporaResult};
use crate::traits::{GenerationOptions, GraphStore, Llm, LlmResponse};
use crate::types::{
    ContentKeywordSet, Entity, GraphSnapshot, Message, QueryKeywords, QueryParams, Relationship,
    RetrievedContext, StoredChunk, TemporalSequence,
};

/// LLM that replays canned replies in order and records every request.
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, TemporaError>>>,
    /// Reply once the script is exhausted.
    fallback: Option<String>,
    pub(crate) requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply with the same text forever.
    pub(crate) fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Queue an error reply.
    pub(crate) fn then_error(self, error: TemporaError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Last message of the n-th request.
    pub(crate) fn prompt(&self, n: usize) -> String {
        self.requests.lock().unwrap()[n]
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn generate(
        &self,
        messages: &[Message],
        _options: Option<GenerationOptions>,
    ) -> TemporaResult<LlmResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(LlmResponse::text(text)),
            Some(Err(e)) => Err(e),
            None => match &self.fallback {
                Some(text) => Ok(LlmResponse::text(text.clone())),
                None => Err(TemporaError::llm_invalid_response("script exhausted")),
            },
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct StoreState {
    entities: BTreeMap<String, Entity>,
    relationships: Vec<(String, String, Relationship)>,
    sequences: Vec<TemporalSequence>,
    keywords: Vec<ContentKeywordSet>,
    chunks: Vec<StoredChunk>,
}

/// Minimal graph store over plain collections. Retrieval matches keywords
/// as substrings of names, descriptions and chunk text.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<StoreState>,
}

fn mentions(text: &str, terms: &[&str]) -> bool {
    let text = text.to_lowercase();
    terms.iter().any(|t| text.contains(&t.to_lowercase()))
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn upsert_entity(&self, key: &str, entity: Entity) -> TemporaResult<()> {
        self.state
            .lock()
            .unwrap()
            .entities
            .insert(key.to_string(), entity);
        Ok(())
    }

    async fn upsert_relationship(
        &self,
        source_key: &str,
        target_key: &str,
        relationship: Relationship,
    ) -> TemporaResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.entities.contains_key(source_key) || !state.entities.contains_key(target_key) {
            return Err(TemporaError::graph_store("relationship endpoint missing"));
        }
        let existing = state.relationships.iter_mut().find(|(s, t, r)| {
            s == source_key && t == target_key && r.description == relationship.description
        });
        match existing {
            Some((_, _, r)) => *r = relationship,
            None => state.relationships.push((
                source_key.to_string(),
                target_key.to_string(),
                relationship,
            )),
        }
        Ok(())
    }

    async fn get_entity(&self, key: &str) -> TemporaResult<Option<Entity>> {
        Ok(self.state.lock().unwrap().entities.get(key).cloned())
    }

    async fn relationships_between(
        &self,
        source_key: &str,
        target_key: &str,
    ) -> TemporaResult<Vec<Relationship>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .relationships
            .iter()
            .filter(|(s, t, _)| s == source_key && t == target_key)
            .map(|(_, _, r)| r.clone())
            .collect())
    }

    async fn upsert_temporal_sequence(&self, sequence: TemporalSequence) -> TemporaResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.sequences.iter_mut().find(|s| s.name == sequence.name) {
            Some(s) => *s = sequence,
            None => state.sequences.push(sequence),
        }
        Ok(())
    }

    async fn upsert_content_keywords(&self, keywords: ContentKeywordSet) -> TemporaResult<()> {
        let mut state = self.state.lock().unwrap();
        match state
            .keywords
            .iter_mut()
            .find(|k| k.source_id == keywords.source_id)
        {
            Some(k) => k.keywords.extend(keywords.keywords),
            None => state.keywords.push(keywords),
        }
        Ok(())
    }

    async fn insert_chunk(&self, chunk: StoredChunk) -> TemporaResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.chunks.iter().any(|c| c.chunk_id == chunk.chunk_id) {
            state.chunks.push(chunk);
        }
        Ok(())
    }

    async fn retrieve(
        &self,
        keywords: &QueryKeywords,
        params: &QueryParams,
    ) -> TemporaResult<RetrievedContext> {
        let state = self.state.lock().unwrap();
        let terms = keywords.all();
        let mut context = RetrievedContext::default();
        if params.mode.uses_graph() {
            context.entities = state
                .entities
                .values()
                .filter(|e| mentions(&e.name, &terms) || mentions(&e.description, &terms))
                .take(params.top_k)
                .cloned()
                .collect();
            context.relationships = state
                .relationships
                .iter()
                .map(|(_, _, r)| r)
                .filter(|r| mentions(&r.description, &terms) || mentions(&r.source, &terms))
                .take(params.top_k)
                .cloned()
                .collect();
            context.temporal_sequences = state.sequences.clone();
        }
        context.chunks = state
            .chunks
            .iter()
            .filter(|c| mentions(&c.content, &terms))
            .take(params.top_k)
            .cloned()
            .collect();
        Ok(context)
    }

    async fn snapshot(&self) -> TemporaResult<GraphSnapshot> {
        let state = self.state.lock().unwrap();
        Ok(GraphSnapshot {
            entities: state.entities.values().cloned().collect(),
            relationships: state
                .relationships
                .iter()
                .map(|(_, _, r)| r.clone())
                .collect(),
            temporal_sequences: state.sequences.clone(),
            content_keywords: state.keywords.clone(),
        })
    }
}
