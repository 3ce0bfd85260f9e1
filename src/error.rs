//! Error types for the dispatcher
//!
//! Decision steps never surface these to the user: a `DecisionFailure` is
//! always converted into a fallback value by the step that produced it.

use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a model-backed decision step could not produce a verdict
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionFailure {
    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("LLM call timed out after {0}ms")]
    Timeout(u64),

    #[error("Model response is not parseable JSON: {0}")]
    Unparseable(String),

    #[error("Model response missing field '{0}'")]
    MissingField(&'static str),

    #[error("Model response has invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Model confidence {0:.2} below threshold")]
    LowConfidence(f32),
}

/// Pending action store failures (backend I/O only)
///
/// Unknown ids, already-resolved ids and expired ids are not errors; they are
/// reported through [`crate::pending::ResolveOutcome`].
#[derive(Error, Debug)]
pub enum PendingStoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
