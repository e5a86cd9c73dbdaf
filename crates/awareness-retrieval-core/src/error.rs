//! Error taxonomy for the retrieval store.
//!
//! Ingestion paths surface every variant to the caller. The search boundary
//! in the application crate absorbs [`RetrievalError::Embedding`],
//! [`RetrievalError::BackendQuery`], and [`RetrievalError::Timeout`] into
//! empty result lists.

use std::time::Duration;

use thiserror::Error;

use crate::models::CollectionName;

/// Failures raised by an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider).
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("embedding provider '{provider}' unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    pub fn unavailable(provider: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("storage initialization failed at {path}: {reason}")]
    StorageInit { path: String, reason: String },

    #[error("unknown collection: '{0}' (expected one of: papers, templates, threats)")]
    UnknownCollection(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("backend error during {operation} on '{collection}': {source:#}")]
    BackendQuery {
        collection: CollectionName,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("limit must be a positive integer, got {0}")]
    InvalidLimit(usize),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
