//! Configuration system for tempora.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{TemporaError, TemporaResult};
use crate::resolution::NamePolicy;
use crate::retry::RetryPolicy;
use crate::synthesis::{ConflictPolicy, MAX_REFERENCES};
use crate::traits::{GraphStoreConfig, LlmConfig};
use crate::types::{QueryMode, ResponseType};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAI,
    Ollama,
    Gemini,
}

impl LlmProvider {
    /// Parse a provider name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "ollama" => Some(Self::Ollama),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }
}

/// Provider configuration with type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Provider type.
    pub provider: LlmProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: LlmConfig,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            config: LlmConfig {
                model: "gpt-4o-mini".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Delimiters, language and vocabulary for the extraction prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Separates fields inside one record.
    pub tuple_delimiter: String,
    /// Separates records.
    pub record_delimiter: String,
    /// Terminates the output of one extraction pass.
    pub completion_delimiter: String,
    /// Output language requested from the extraction model.
    pub language: String,
    /// Suggested entity types. Other types are still accepted.
    pub entity_types: Vec<String>,
    /// Maximum continuation passes per chunk.
    pub max_gleaning: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tuple_delimiter: "<|>".to_string(),
            record_delimiter: "##".to_string(),
            completion_delimiter: "<|COMPLETE|>".to_string(),
            language: "English".to_string(),
            entity_types: ["organization", "person", "geo", "event", "category", "date"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_gleaning: 1,
        }
    }
}

/// Entity resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub name_policy: NamePolicy,
    /// Number of accumulated descriptions from which the summarizer is used.
    pub summarize_threshold: usize,
    /// Retry policy for summarization calls.
    pub retry: RetryPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            name_policy: NamePolicy::default(),
            summarize_threshold: 2,
            retry: RetryPolicy::default(),
        }
    }
}

/// Query-time settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Upper bound on each retrieved list.
    pub top_k: usize,
    pub mode: QueryMode,
    pub response_type: ResponseType,
    /// Maximum reference lines in an answer, at most 5.
    pub max_references: usize,
    /// Number of prior turns included in prompts.
    pub history_turns: usize,
    /// How disagreeing relationships are settled in answers.
    pub conflict: ConflictPolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            mode: QueryMode::Hybrid,
            response_type: ResponseType::MultipleParagraphs,
            max_references: 5,
            history_turns: 3,
            conflict: ConflictPolicy::default(),
        }
    }
}

/// Main tempora configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporaConfig {
    /// LLM configuration.
    pub llm: LlmProviderConfig,
    /// Graph store configuration.
    pub graph_store: GraphStoreConfig,
    pub extraction: ExtractionConfig,
    pub resolver: ResolverConfig,
    pub query: QueryConfig,
    /// Retry policy for extraction, classification and composition calls.
    pub retry: RetryPolicy,
    /// Chunks extracted concurrently during ingestion.
    pub ingest_concurrency: usize,
}

impl Default for TemporaConfig {
    fn default() -> Self {
        Self {
            llm: LlmProviderConfig::default(),
            graph_store: GraphStoreConfig::default(),
            extraction: ExtractionConfig::default(),
            resolver: ResolverConfig::default(),
            query: QueryConfig::default(),
            retry: RetryPolicy::default(),
            ingest_concurrency: 4,
        }
    }
}

impl TemporaConfig {
    /// Default configuration file location (`~/.tempora/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".tempora"))
            .unwrap_or_else(|| PathBuf::from(".tempora"))
            .join("config.toml")
    }

    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> TemporaResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| TemporaError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| TemporaError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| TemporaError::Configuration(e.to_string()))?,
            _ => {
                return Err(TemporaError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `TEMPORA_*` environment variables.
    pub fn from_env() -> TemporaResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> TemporaResult<()> {
        // LLM configuration
        if let Some(provider) = lookup("TEMPORA_LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&provider).ok_or_else(|| {
                TemporaError::UnsupportedProvider {
                    provider: provider.clone(),
                }
            })?;
        }
        if let Some(model) = lookup("TEMPORA_LLM_MODEL") {
            self.llm.config.model = model;
        }
        if let Some(base_url) = lookup("TEMPORA_LLM_BASE_URL") {
            self.llm.config.base_url = Some(base_url);
        }
        let provider_key = match self.llm.provider {
            LlmProvider::OpenAI => lookup("OPENAI_API_KEY"),
            LlmProvider::Gemini => lookup("GEMINI_API_KEY"),
            LlmProvider::Ollama => None,
        };
        if let Some(api_key) = lookup("TEMPORA_LLM_API_KEY").or(provider_key) {
            self.llm.config.api_key = Some(api_key);
        }

        // Extraction
        if let Some(language) = lookup("TEMPORA_LANGUAGE") {
            self.extraction.language = language;
        }
        if let Some(types) = lookup("TEMPORA_ENTITY_TYPES") {
            self.extraction.entity_types = types
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(v) = lookup("TEMPORA_MAX_GLEANING") {
            self.extraction.max_gleaning = parse_number("TEMPORA_MAX_GLEANING", &v)?;
        }

        // Query
        if let Some(v) = lookup("TEMPORA_TOP_K") {
            self.query.top_k = parse_number("TEMPORA_TOP_K", &v)?;
        }
        if let Some(v) = lookup("TEMPORA_QUERY_MODE") {
            self.query.mode = QueryMode::from_str(v.trim()).map_err(|_| {
                TemporaError::Configuration(format!(
                    "TEMPORA_QUERY_MODE must be one of {}",
                    QueryMode::all_names().join(", ")
                ))
            })?;
        }
        if let Some(v) = lookup("TEMPORA_RESPONSE_TYPE") {
            self.query.response_type = ResponseType::from_str_flexible(&v).ok_or_else(|| {
                TemporaError::Configuration(format!("unknown response type '{}'", v))
            })?;
        }

        // Graph store and pipeline
        if let Some(path) = lookup("TEMPORA_SNAPSHOT_PATH") {
            self.graph_store.snapshot_path = Some(PathBuf::from(path));
        }
        if let Some(v) = lookup("TEMPORA_INGEST_CONCURRENCY") {
            self.ingest_concurrency = parse_number("TEMPORA_INGEST_CONCURRENCY", &v)?;
        }

        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> TemporaResult<()> {
        let e = &self.extraction;
        let delimiters = [
            &e.tuple_delimiter,
            &e.record_delimiter,
            &e.completion_delimiter,
        ];
        if delimiters.iter().any(|d| d.is_empty()) {
            return Err(TemporaError::Configuration(
                "extraction delimiters must not be empty".to_string(),
            ));
        }
        if e.tuple_delimiter == e.record_delimiter || e.record_delimiter == e.completion_delimiter
        {
            return Err(TemporaError::Configuration(
                "extraction delimiters must be distinct".to_string(),
            ));
        }
        if self.query.top_k == 0 {
            return Err(TemporaError::Configuration(
                "query.top_k must be at least 1".to_string(),
            ));
        }
        if self.query.max_references > MAX_REFERENCES {
            return Err(TemporaError::Configuration(format!(
                "query.max_references must be at most {}, got {}",
                MAX_REFERENCES, self.query.max_references
            )));
        }
        if self.ingest_concurrency == 0 {
            return Err(TemporaError::Configuration(
                "ingest_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> TemporaConfigBuilder {
        TemporaConfigBuilder::default()
    }
}

fn parse_number(key: &str, value: &str) -> TemporaResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| TemporaError::Configuration(format!("{} must be a number, got '{}'", key, value)))
}

/// Builder for TemporaConfig.
#[derive(Default)]
pub struct TemporaConfigBuilder {
    config: TemporaConfig,
}

impl TemporaConfigBuilder {
    /// Set LLM configuration.
    pub fn llm(mut self, config: LlmProviderConfig) -> Self {
        self.config.llm = config;
        self
    }

    /// Set graph store configuration.
    pub fn graph_store(mut self, config: GraphStoreConfig) -> Self {
        self.config.graph_store = config;
        self
    }

    /// Set extraction configuration.
    pub fn extraction(mut self, config: ExtractionConfig) -> Self {
        self.config.extraction = config;
        self
    }

    /// Set resolver configuration.
    pub fn resolver(mut self, config: ResolverConfig) -> Self {
        self.config.resolver = config;
        self
    }

    /// Set query configuration.
    pub fn query(mut self, config: QueryConfig) -> Self {
        self.config.query = config;
        self
    }

    /// Set the retry policy for model calls.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set ingestion concurrency.
    pub fn ingest_concurrency(mut self, n: usize) -> Self {
        self.config.ingest_concurrency = n;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> TemporaResult<TemporaConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TemporaConfig::default();
        assert_eq!(config.extraction.tuple_delimiter, "<|>");
        assert_eq!(config.extraction.record_delimiter, "##");
        assert_eq!(config.extraction.completion_delimiter, "<|COMPLETE|>");
        assert_eq!(config.extraction.entity_types.len(), 6);
        assert_eq!(config.query.top_k, 5);
        assert_eq!(config.query.mode, QueryMode::Hybrid);
        assert!(config.validate().is_ok());
        assert!(TemporaConfig::default_path().ends_with(".tempora/config.toml"));
    }

    #[test]
    fn test_from_toml_file_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
ingest_concurrency = 2

[llm]
provider = "ollama"
model = "llama3"

[extraction]
language = "German"
max_gleaning = 0

[query]
mode = "naive"
response_type = "bullets"
"#
        )
        .unwrap();

        let config = TemporaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.config.model, "llama3");
        assert_eq!(config.extraction.language, "German");
        assert_eq!(config.extraction.max_gleaning, 0);
        assert_eq!(config.extraction.tuple_delimiter, "<|>");
        assert_eq!(config.query.mode, QueryMode::Naive);
        assert_eq!(config.query.response_type, ResponseType::Bullets);
        assert_eq!(config.ingest_concurrency, 2);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            TemporaConfig::from_file(file.path()),
            Err(TemporaError::Configuration(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TEMPORA_LLM_PROVIDER", "gemini"),
            ("GEMINI_API_KEY", "g-key"),
            ("TEMPORA_TOP_K", "8"),
            ("TEMPORA_QUERY_MODE", "Local"),
            ("TEMPORA_RESPONSE_TYPE", "single line"),
            ("TEMPORA_ENTITY_TYPES", "person, team ,"),
        ]
        .into_iter()
        .collect();

        let mut config = TemporaConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.config.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.query.top_k, 8);
        assert_eq!(config.query.mode, QueryMode::Local);
        assert_eq!(config.query.response_type, ResponseType::SingleLine);
        assert_eq!(config.extraction.entity_types, vec!["person", "team"]);
    }

    #[test]
    fn test_bad_override_is_error() {
        let mut config = TemporaConfig::default();
        let err = config
            .apply_overrides(|k| (k == "TEMPORA_TOP_K").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, TemporaError::Configuration(_)));
    }

    #[test]
    fn test_builder_validates() {
        assert!(TemporaConfig::builder().ingest_concurrency(0).build().is_err());
        let config = TemporaConfig::builder()
            .query(QueryConfig {
                top_k: 3,
                ..Default::default()
            })
            .build()
            .unwrap();
        assert_eq!(config.query.top_k, 3);
    }

    #[test]
    fn test_reference_cap_is_validated() {
        let err = TemporaConfig::builder()
            .query(QueryConfig {
                max_references: 10,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_references"));
        assert!(TemporaConfig::builder()
            .query(QueryConfig {
                max_references: 3,
                ..Default::default()
            })
            .build()
            .is_ok());
    }
}
