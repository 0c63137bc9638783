//! Metadata keys stored in the `store_meta` table

use std::fmt;

/// Strongly-typed metadata keys to avoid string literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    /// Layout version of the store file
    SchemaVersion,
    /// Embedding dimension fixed at schema creation
    Dimension,
    /// Model identifier the store was created with
    Model,
    /// RFC 3339 timestamp of the first configure
    CreatedAt,
}

impl MetadataKey {
    /// Get the string key for the meta table
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaVersion => "schema_version",
            Self::Dimension => "embedding_dimension",
            Self::Model => "embedding_model",
            Self::CreatedAt => "created_at",
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
