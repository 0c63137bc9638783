//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed (an empty query result is acceptable)
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - the store must be repaired or rebound before use
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::StoreError;

/// Standard exit codes for CLI operations.
///
/// These codes follow Unix conventions where 0 indicates success,
/// and non-zero values indicate various error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Query or listing returned nothing (code 3)
    NotFound = 3,

    /// Embedding provider failed or timed out (code 4)
    ProviderError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Index and chunk table disagree (code 7)
    IndexDrift = 7,

    /// Batch finished but some documents failed (code 8)
    PartialFailure = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Convert a `StoreError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &StoreError) -> Self {
        match error {
            // Store unusable until repaired or rebound
            StoreError::Schema { .. }
            | StoreError::DimensionMismatch { .. }
            | StoreError::ModelMismatch { .. } => ExitCode::BlockingError,

            StoreError::Provider(_) | StoreError::ProviderTimeout { .. } => {
                ExitCode::ProviderError
            }

            StoreError::FileRead { .. }
            | StoreError::StoreDirectory { .. }
            | StoreError::Output(_) => ExitCode::IoError,
            StoreError::Config { .. } | StoreError::Chunking(_) => ExitCode::ConfigError,

            // Everything else is a general error
            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    ///
    /// Blocking errors should halt automation pipelines.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::ProviderError => "Embedding provider error",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IndexDrift => "Index drift - run update-index",
            ExitCode::PartialFailure => "Some documents failed",
        }
    }
}
