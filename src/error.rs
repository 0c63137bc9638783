//! Error types for the note vector store
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::chunking::ChunkingError;
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Schema creation or validation failed; the store is unusable until repaired
    #[error("Store schema error: {reason}")]
    Schema { reason: String },

    /// Provider dimension does not match the dimension the store was created with
    #[error(
        "Embedding dimension mismatch: store was created for {expected} dimensions, provider produces {actual}"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Store was created with model '{stored}' but '{requested}' was requested")]
    ModelMismatch { stored: String, requested: String },

    /// Embedding model load or inference failure
    #[error("Embedding provider failed: {0}")]
    Provider(#[source] VectorError),

    #[error("Embedding provider timed out after {seconds}s")]
    ProviderTimeout { seconds: u64 },

    /// Chunk insert/delete failure, rolled back
    #[error("Transaction failed during {operation}: {source}")]
    Transaction {
        operation: &'static str,
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Vector(#[from] VectorError),

    #[error("Invalid chunking parameters: {0}")]
    Chunking(#[from] ChunkingError),

    /// File system errors
    #[error("Failed to read document '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to prepare store directory '{path}': {source}")]
    StoreDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl StoreError {
    /// Classify a provider-side failure.
    pub fn from_provider(error: VectorError) -> Self {
        match error {
            VectorError::Timeout(timeout) => Self::ProviderTimeout {
                seconds: timeout.as_secs(),
            },
            other => Self::Provider(other),
        }
    }

    /// Wrap a SQLite error raised while a named transaction was in flight.
    pub fn transaction(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Transaction { operation, source }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::ModelMismatch { .. } => "MODEL_MISMATCH",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::ProviderTimeout { .. } => "PROVIDER_TIMEOUT",
            Self::Transaction { .. } => "TRANSACTION_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::Chunking(_) => "INVALID_CHUNKING",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::StoreDirectory { .. } => "STORE_DIRECTORY_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Output(_) => "OUTPUT_ERROR",
        }
        .to_string()
    }

    /// Errors scoped to a single document.
    ///
    /// A bulk embed records these and moves on to the next document; any
    /// other error aborts the batch.
    pub fn is_document_level(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::ProviderTimeout { .. } | Self::FileRead { .. } | Self::Chunking(_)
        )
    }

    /// Whether the store must be repaired before further use.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. } | Self::DimensionMismatch { .. } | Self::ModelMismatch { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Schema { .. } => vec![
                "Check that the store file is a notevault database",
                "Move the store file aside and run 'notevault configure' to recreate it",
            ],
            Self::DimensionMismatch { .. } | Self::ModelMismatch { .. } => vec![
                "Use the embedding model the store was created with",
                "Or point store.path at a new file and re-embed the workspace",
            ],
            Self::Provider(_) => vec![
                "The document was left without chunks; re-run the embed to retry",
                "Check the model cache directory and network access for first-time downloads",
            ],
            Self::ProviderTimeout { .. } => vec![
                "Retry the operation, model loading is slow on first use",
                "Raise embedding.timeout_secs in .notevault/settings.toml",
            ],
            Self::Transaction { .. } => vec![
                "The operation was rolled back, the store is in a consistent state",
                "Try the operation again, it may succeed on retry",
            ],
            Self::Vector(VectorError::DuplicateRow(_)) => {
                vec!["Run 'notevault update-index' to rebuild the similarity index"]
            }
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure store.workspace_root points at the workspace directory",
            ],
            Self::Chunking(_) => vec!["Use a chunk overlap smaller than the chunk size"],
            _ => vec![],
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
