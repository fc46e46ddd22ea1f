//! Error types for Tadabbur.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application: configuration, I/O, model providers, prompts,
//! request validation, quota, retrieval, generation and storage.

use thiserror::Error;

/// Unified error type for Tadabbur.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Missing or malformed request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Daily request quota exhausted for the caller
    #[error("Daily request limit reached (resets at {reset_time})")]
    QuotaExceeded {
        /// RFC 3339 estimate of when the quota resets
        reset_time: String,
    },

    /// Embedding or vector index failures
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Answer generation failures
    #[error("Generation error: {0}")]
    Generation(String),

    /// History and usage persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Stable machine-readable code, surfaced as `error_code` on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::QuotaExceeded { .. } => "quota_exceeded",
            AppError::Retrieval(_) => "retrieval_error",
            AppError::Generation(_) | AppError::Llm(_) => "generation_error",
            _ => "internal_error",
        }
    }

    /// Whether the caller can fix the request themselves.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::QuotaExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
