//! Type-safe wrappers and core types for the similarity index.
//!
//! Row ids, distances and dimensions are newtypes so the chunk table and the
//! index can never be addressed with a bare integer or compared with a NaN.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Standard vector dimension for note embeddings (all-MiniLM-L6-v2 model).
pub const VECTOR_DIMENSION_384: usize = 384;

/// Number of bytes per f32 value in an embedding blob.
const BYTES_PER_F32: usize = 4;

/// Row id shared by the chunk table and the similarity index.
///
/// Assigned by the chunk store (SQLite `AUTOINCREMENT`), always positive and
/// never reused within a store's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RowId(i64);

impl RowId {
    /// Creates a new `RowId`.
    ///
    /// Returns `None` if the provided id is zero or negative.
    #[must_use]
    pub fn new(id: i64) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    /// Returns the underlying i64 value.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of row ids allocated by one chunk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    first: RowId,
    last: RowId,
}

impl RowRange {
    /// Creates a range, returning `None` when `last` precedes `first`.
    #[must_use]
    pub fn new(first: RowId, last: RowId) -> Option<Self> {
        (first <= last).then_some(Self { first, last })
    }

    #[must_use]
    pub const fn first(&self) -> RowId {
        self.first
    }

    #[must_use]
    pub const fn last(&self) -> RowId {
        self.last
    }

    /// Number of rows in the range.
    #[must_use]
    pub fn len(&self) -> usize {
        (self.last.get() - self.first.get() + 1) as usize
    }

    /// A range always holds at least one row.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn contains(&self, id: RowId) -> bool {
        self.first <= id && id <= self.last
    }

    /// Iterates the row ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RowId> + use<> {
        (self.first.get()..=self.last.get()).map(RowId)
    }
}

/// Euclidean distance between a query and an indexed embedding.
///
/// Smaller is closer. NaN is rejected at construction, which makes the
/// total ordering below sound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance(f32);

impl Distance {
    /// Creates a new `Distance` with validation.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidDistance {
                value,
                reason: "Distance cannot be NaN",
            });
        }
        if value < 0.0 {
            return Err(VectorError::InvalidDistance {
                value,
                reason: "Distance cannot be negative",
            });
        }
        Ok(Self(value))
    }

    /// Distance of a vector to itself.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub const fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Distance {}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// The dimension is fixed when the store schema is created; every embedding
/// written to either structure is validated against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Size in bytes of one encoded embedding of this dimension.
    #[must_use]
    pub const fn blob_len(&self) -> usize {
        self.0 * BYTES_PER_F32
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(VectorError::NonFinite);
        }
        Ok(())
    }

    /// Encodes a vector as a little-endian f32 blob after validating it.
    pub fn encode(&self, vector: &[f32]) -> Result<Vec<u8>, VectorError> {
        self.validate_vector(vector)?;
        let mut bytes = Vec::with_capacity(self.blob_len());
        for &value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Ok(bytes)
    }

    /// Decodes a little-endian f32 blob written by [`VectorDimension::encode`].
    pub fn decode(&self, blob: &[u8]) -> Result<Vec<f32>, VectorError> {
        if blob.len() != self.blob_len() {
            return Err(VectorError::Serialization(format!(
                "invalid embedding byte length: expected {}, got {}",
                self.blob_len(),
                blob.len()
            )));
        }
        Ok(blob
            .chunks_exact(BYTES_PER_F32)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

impl fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Euclidean (L2) distance between two vectors of equal length.
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid distance value: {value}\nReason: {reason}")]
    InvalidDistance { value: f32, reason: &'static str },

    #[error("Vector contains non-finite values\nSuggestion: Check the embedding model output")]
    NonFinite,

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error(
        "Unknown embedding model '{0}'\nSuggestion: Use one of AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, NomicEmbedTextV15"
    )]
    UnknownModel(String),

    #[error(
        "Embedding provider did not answer within {0:?}\nSuggestion: Retry, or raise embedding.timeout_secs for slow model loads"
    )]
    Timeout(Duration),

    #[error(
        "Embedding provider returned {actual} vectors for {expected} texts\nSuggestion: The provider must return one vector per input text"
    )]
    BatchLength { expected: usize, actual: usize },

    #[error(
        "Row {0} is already indexed\nSuggestion: Filter existing ids or run a full index rebuild"
    )]
    DuplicateRow(RowId),

    #[error(
        "Serialization error: {0}\nSuggestion: Check that vector data is valid and not corrupted"
    )]
    Serialization(String),
}
