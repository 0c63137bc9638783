//! SQL definitions for the store file.
//!
//! Chunk rows and index entries live in separate tables without a foreign
//! key between them: the engine keeps them mirrored, and a full index
//! rebuild repairs any drift.

/// Current layout version recorded under `schema_version`.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_META_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub const CREATE_CHUNKS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS note_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_name TEXT NOT NULL,
    document_path TEXT NOT NULL,
    text_chunk TEXT NOT NULL CHECK (length(text_chunk) > 0),
    embedding BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_note_chunks_document
    ON note_chunks(document_name);
"#;

pub const CREATE_INDEX_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chunk_index (
    row_id INTEGER PRIMARY KEY,
    embedding BLOB NOT NULL
);
"#;

/// Column probes run after creation; a table created by something else
/// fails here instead of on first use.
pub const PROBE_CHUNKS_SQL: &str =
    "SELECT id, document_name, document_path, text_chunk, embedding FROM note_chunks LIMIT 0";

pub const PROBE_INDEX_SQL: &str = "SELECT row_id, embedding FROM chunk_index LIMIT 0";
