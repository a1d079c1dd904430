//! Error types for tempora operations.
//!
//! Only failures that abort the current document or query are errors.
//! Recoverable conditions (malformed extraction records, summarization
//! fallbacks, empty retrieval) are reported as values by the component
//! that observed them.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for tempora operations.
pub type TemporaResult<T> = Result<T, TemporaError>;

/// Main error type for all tempora operations.
#[derive(Error, Debug)]
pub enum TemporaError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
        suggestion: Option<String>,
    },

    /// Rate limit exceeded by an external model endpoint.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        code: ErrorCode,
        retry_after: Option<u64>,
    },

    /// LLM operation failed.
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query keyword classification returned an unusable structure.
    #[error("Classification error: {message}")]
    Classification { message: String, code: ErrorCode },

    /// Graph store operation failed.
    #[error("Graph store error: {message}")]
    GraphStore {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external call exceeded its time bound.
    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
        code: ErrorCode,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network error.
    #[error("Network error: {message}")]
    Network {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Provider not supported.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,

    // Rate Limit (RATE_xxx)
    RateLimitExceeded,

    // LLM (LLM_xxx)
    LlmGenerationFailed,
    LlmInvalidResponse,

    // Classification (CLS_xxx)
    ClsInvalidStructure,
    ClsMissingTier,

    // Graph (GRP_xxx)
    GrpOperationFailed,

    // Network (NET_xxx)
    NetTimeout,
    NetConnectionFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::RateLimitExceeded => "RATE_001",
            ErrorCode::LlmGenerationFailed => "LLM_002",
            ErrorCode::LlmInvalidResponse => "LLM_003",
            ErrorCode::ClsInvalidStructure => "CLS_001",
            ErrorCode::ClsMissingTier => "CLS_002",
            ErrorCode::GrpOperationFailed => "GRP_002",
            ErrorCode::NetTimeout => "NET_001",
            ErrorCode::NetConnectionFailed => "NET_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl TemporaError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create an LLM error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmGenerationFailed,
            source: None,
        }
    }

    /// Create an LLM error for a reply that could not be used.
    pub fn llm_invalid_response(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmInvalidResponse,
            source: None,
        }
    }

    /// Create a classification error.
    pub fn classification(message: impl Into<String>) -> Self {
        Self::Classification {
            message: message.into(),
            code: ErrorCode::ClsInvalidStructure,
        }
    }

    /// Create a classification error for a missing keyword tier.
    pub fn missing_tier(tier: &str) -> Self {
        Self::Classification {
            message: format!("keyword tier '{}' missing from classification output", tier),
            code: ErrorCode::ClsMissingTier,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
            code: ErrorCode::NetTimeout,
        }
    }

    /// Create a graph store error.
    pub fn graph_store(message: impl Into<String>) -> Self {
        Self::GraphStore {
            message: message.into(),
            code: ErrorCode::GrpOperationFailed,
            source: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
            code: ErrorCode::RateLimitExceeded,
            retry_after: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::RateLimit { code, .. } => *code,
            Self::Llm { code, .. } => *code,
            Self::Classification { code, .. } => *code,
            Self::GraphStore { code, .. } => *code,
            Self::Timeout { code, .. } => *code,
            Self::Network { code, .. } => *code,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Timeouts, rate limits, network failures and generation failures are
    /// transient. Invalid replies, validation and configuration errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimit { .. } | Self::Network { .. } => true,
            Self::Llm { code, .. } => *code != ErrorCode::LlmInvalidResponse,
            _ => false,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::RateLimit { .. } => Some("Please wait before making more requests"),
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::Llm { .. } => Some("Please check your LLM provider configuration"),
            Self::Classification { .. } => {
                Some("The keyword model must return high_level, low_level and temporal arrays")
            }
            Self::Timeout { .. } => Some("Increase retry.timeout_secs or check the model endpoint"),
            _ => None,
        }
    }

    /// Convert from HTTP status code (for provider responses).
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            400 => Self::Validation {
                message: body.to_string(),
                code: ErrorCode::ValInvalidInput,
                details: HashMap::new(),
                suggestion: Some("Please check your request parameters".to_string()),
            },
            408 | 504 => Self::timeout(body.to_string(), 0),
            429 => Self::rate_limit(body),
            500..=599 => Self::Network {
                message: format!("HTTP {}: {}", status, body),
                code: ErrorCode::NetConnectionFailed,
                source: None,
            },
            _ => Self::Internal(format!("HTTP {}: {}", status, body)),
        }
    }
}
