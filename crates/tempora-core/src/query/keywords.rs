//! Query keyword tiering.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::json_parser::extract_json;
use crate::error::{TemporaError, TemporaResult};
use crate::extraction::prompts::keywords_extraction_prompt;
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{GenerationOptions, Llm};
use crate::types::{format_messages, Message, QueryKeywords};

/// JSON keys of the three tiers, in output order.
pub const HIGH_LEVEL_KEY: &str = "high_level_keywords";
pub const LOW_LEVEL_KEY: &str = "low_level_keywords";
pub const TEMPORAL_KEY: &str = "temporal_keywords";

/// Splits a query into high-level, low-level and temporal keywords using a
/// classification model.
pub struct KeywordTiering {
    llm: Arc<dyn Llm>,
    retry: RetryPolicy,
    history_turns: usize,
}

impl KeywordTiering {
    pub fn new(llm: Arc<dyn Llm>, retry: RetryPolicy) -> Self {
        Self {
            llm,
            retry,
            history_turns: 3,
        }
    }

    /// Number of prior user/assistant exchanges included in the prompt.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Classify `query` given the prior turns, oldest first.
    ///
    /// A reply missing a tier or with a non-string entry is a classification
    /// error, never an empty result.
    pub async fn classify(&self, query: &str, history: &[Message]) -> TemporaResult<QueryKeywords> {
        let query = query.trim();
        if query.is_empty() {
            return Err(TemporaError::validation("query is empty"));
        }

        let recent = recent_turns(history, self.history_turns);
        let prompt = keywords_extraction_prompt(query, &format_messages(recent));
        let messages = [Message::user(prompt)];
        let options = self.llm.supports_json_mode().then(GenerationOptions::json);

        let reply = with_retry(&self.retry, "keyword tiering", || {
            self.llm.complete(&messages, options.clone())
        })
        .await?;
        let keywords = parse_keywords(&reply)?;
        debug!(
            "Query keywords: {} high, {} low, {} temporal",
            keywords.high_level.len(),
            keywords.low_level.len(),
            keywords.temporal.len()
        );
        Ok(keywords)
    }
}

/// The last `turns` exchanges of a conversation.
fn recent_turns(history: &[Message], turns: usize) -> &[Message] {
    let keep = turns.saturating_mul(2);
    &history[history.len().saturating_sub(keep)..]
}

/// Parse a classification reply strictly.
pub fn parse_keywords(reply: &str) -> TemporaResult<QueryKeywords> {
    let json = extract_json(reply);
    let value: Value = serde_json::from_str(&json).map_err(|e| {
        TemporaError::classification(format!("classification output is not JSON: {}", e))
    })?;
    let object = value
        .as_object()
        .ok_or_else(|| TemporaError::classification("classification output is not an object"))?;

    let tier = |key: &str| -> TemporaResult<Vec<String>> {
        let items = object
            .get(key)
            .ok_or_else(|| TemporaError::missing_tier(key))?
            .as_array()
            .ok_or_else(|| TemporaError::classification(format!("'{}' is not an array", key)))?;
        let mut out: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            let text = item.as_str().ok_or_else(|| {
                TemporaError::classification(format!("'{}' holds a non-string value", key))
            })?;
            let text = text.trim();
            if !text.is_empty() && !out.iter().any(|k| k == text) {
                out.push(text.to_string());
            }
        }
        Ok(out)
    };

    Ok(QueryKeywords {
        high_level: tier(HIGH_LEVEL_KEY)?,
        low_level: tier(LOW_LEVEL_KEY)?,
        temporal: tier(TEMPORAL_KEY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::test_support::ScriptedLlm;

    const REPLY: &str = r#"{
        "high_level_keywords": ["Athletics records", "Sports history"],
        "low_level_keywords": ["Noah Carter", " 100m sprint ", "Noah Carter", ""],
        "temporal_keywords": ["2024", "Sports history"]
    }"#;

    #[test]
    fn test_parse_keywords_cleans_tiers() {
        let keywords = parse_keywords(REPLY).unwrap();
        assert_eq!(keywords.high_level, vec!["Athletics records", "Sports history"]);
        assert_eq!(keywords.low_level, vec!["Noah Carter", "100m sprint"]);
        // Terms may repeat across tiers.
        assert_eq!(keywords.temporal, vec!["2024", "Sports history"]);
    }

    #[test]
    fn test_parse_keywords_accepts_fenced_and_empty_tiers() {
        let fenced = "```json\n{\"high_level_keywords\": [], \"low_level_keywords\": [\"Tokyo\"], \"temporal_keywords\": []}\n```";
        let keywords = parse_keywords(fenced).unwrap();
        assert!(keywords.high_level.is_empty());
        assert_eq!(keywords.low_level, vec!["Tokyo"]);
    }

    #[test]
    fn test_missing_tier_is_error() {
        let err = parse_keywords(r#"{"high_level_keywords": [], "low_level_keywords": []}"#)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ClsMissingTier);
    }

    #[test]
    fn test_malformed_output_is_error() {
        assert!(parse_keywords("I could not find keywords").is_err());
        assert!(parse_keywords(r#"["a", "b"]"#).is_err());
        let wrong_type = r#"{"high_level_keywords": "a", "low_level_keywords": [], "temporal_keywords": []}"#;
        assert_eq!(
            parse_keywords(wrong_type).unwrap_err().code(),
            ErrorCode::ClsInvalidStructure
        );
        let non_string = r#"{"high_level_keywords": [1], "low_level_keywords": [], "temporal_keywords": []}"#;
        assert!(parse_keywords(non_string).is_err());
    }

    #[tokio::test]
    async fn test_classify_sends_recent_history() {
        let llm = Arc::new(ScriptedLlm::new([REPLY]));
        let tiering = KeywordTiering::new(llm.clone(), RetryPolicy::no_retry()).with_history_turns(1);
        let history = vec![
            Message::user("Who won in 2020?"),
            Message::assistant("Jane Doe."),
            Message::user("And in 2024?"),
            Message::assistant("Noah Carter."),
        ];
        let keywords = tiering
            .classify("When did Noah Carter set the record?", &history)
            .await
            .unwrap();
        assert_eq!(keywords.temporal[0], "2024");

        let prompt = llm.prompt(0);
        assert!(prompt.contains("user: And in 2024?\nassistant: Noah Carter."));
        assert!(!prompt.contains("Who won in 2020?"));
        assert!(prompt.contains("Current Query: When did Noah Carter set the record?"));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let llm = Arc::new(ScriptedLlm::new([REPLY]));
        let tiering = KeywordTiering::new(llm.clone(), RetryPolicy::no_retry());
        let err = tiering.classify("   ", &[]).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert_eq!(llm.call_count(), 0);
    }
}
