//! Engine-wide error taxonomy.
//!
//! Components wrap lower-level failures (`sqlx`, `reqwest`, provider
//! responses) into one of these variants at their boundary; the store
//! trait itself stays on `anyhow::Result` and callers classify.

use thiserror::Error;

/// Errors produced by the analysis and recommendation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input: dimension mismatch, zero-magnitude vector, bad parameter.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown article, user, or analysis record.
    #[error("not found: {0}")]
    NotFound(String),

    /// An AI collaborator call failed (encoder, classifier, or tagger).
    #[error("model inference failed: {0}")]
    Compute(#[source] anyhow::Error),

    /// A store read or write failed.
    #[error("store operation failed: {0}")]
    Persistence(#[source] anyhow::Error),

    /// An analysis run is already underway for this article.
    #[error("analysis already in progress for article {0}")]
    Conflict(i64),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Self::Validation(what.into())
    }

    pub fn compute(err: impl Into<anyhow::Error>) -> Self {
        Self::Compute(err.into())
    }

    pub fn persistence(err: impl Into<anyhow::Error>) -> Self {
        Self::Persistence(err.into())
    }
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
