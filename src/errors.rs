//! Error types for DocBuddy
//!
//! One error enum for the whole library. Every variant maps to a stable
//! wire name so the session layer can report failures without leaking
//! formatting details to callers.

use thiserror::Error;

/// Main error type for the DocBuddy question-answering system
#[derive(Error, Debug)]
pub enum DocError {
    /// Planner produced output that cannot be turned into sub-questions
    #[error("Planning failed: {0}")]
    Planning(String),

    /// Corpus store unreachable or rejected the query
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Critic could not score a research result
    #[error("Critique failed: {0}")]
    Critique(String),

    /// Answer could not be grounded in the retrieved context
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// Run was cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,

    /// Retry budget for a sub-question ran out (informational)
    #[error("Retry budget exhausted for sub-question {ordinal} after {attempts} attempts")]
    RetryBudgetExhausted { ordinal: usize, attempts: u32 },

    /// State machine transition errors
    #[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Language model call failed
    #[error("Model error: {0}")]
    Model(String),

    /// Document loading or chunking failed
    #[error("Ingest error: {0}")]
    Ingest(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for DocBuddy operations
pub type Result<T> = std::result::Result<T, DocError>;

impl DocError {
    /// Stable name used on the wire and in logs
    pub fn kind(&self) -> &'static str {
        match self {
            DocError::Planning(_) => "PlanningError",
            DocError::Retrieval(_) => "RetrievalError",
            DocError::Critique(_) => "CritiqueError",
            DocError::Synthesis(_) => "SynthesisError",
            DocError::Cancelled => "Cancelled",
            DocError::RetryBudgetExhausted { .. } => "RetryBudgetExhausted",
            DocError::InvalidTransition { .. } => "InvalidTransition",
            DocError::Model(_) => "ModelError",
            DocError::Ingest(_) => "IngestError",
            DocError::Config(_) => "ConfigError",
            DocError::Http(_) => "HttpError",
            DocError::Serialization(_) => "SerializationError",
            DocError::Io(_) => "IoError",
        }
    }

    /// Whether the orchestrator may spend a retry on this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, DocError::Retrieval(_))
    }
}

/// Convert anyhow errors coming out of collaborators
impl From<anyhow::Error> for DocError {
    fn from(err: anyhow::Error) -> Self {
        DocError::Ingest(err.to_string())
    }
}

impl From<toml::de::Error> for DocError {
    fn from(err: toml::de::Error) -> Self {
        DocError::Config(format!("Failed to parse config: {}", err))
    }
}
