//! Chunk table: the authoritative record of every embedded span of text.

use crate::error::{StoreError, StoreResult};
use crate::storage::database::with_savepoint;
use crate::storage::schema::{CREATE_CHUNKS_SQL, PROBE_CHUNKS_SQL};
use crate::vector::{IndexEntry, RowId, RowRange, VectorDimension};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;

/// A chunk waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A stored chunk row.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub row_id: RowId,
    pub document_name: String,
    pub document_path: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

type RawChunk = (i64, String, String, String, Vec<u8>);

const SELECT_CHUNK: &str =
    "SELECT id, document_name, document_path, text_chunk, embedding FROM note_chunks";

/// Row-id addressed chunk storage over a borrowed connection.
pub struct ChunkStore<'conn> {
    conn: &'conn Connection,
    dimension: VectorDimension,
}

impl<'conn> ChunkStore<'conn> {
    pub fn new(conn: &'conn Connection, dimension: VectorDimension) -> Self {
        Self { conn, dimension }
    }

    /// Create the chunk table if missing. Safe to call on an existing store.
    pub fn create_schema(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(CREATE_CHUNKS_SQL)
            .and_then(|()| self.conn.prepare(PROBE_CHUNKS_SQL).map(|_| ()))
            .map_err(|e| StoreError::Schema {
                reason: format!("note_chunks: {e}"),
            })
    }

    /// Insert all chunks of one document.
    ///
    /// All-or-nothing: vectors are validated before anything is written, and
    /// a failing row rolls back the rows before it. Returns the contiguous
    /// row-id range assigned, or `None` when `chunks` is empty.
    pub fn insert_chunks(
        &self,
        document_name: &str,
        document_path: &str,
        chunks: &[NewChunk],
    ) -> StoreResult<Option<RowRange>> {
        if chunks.is_empty() {
            return Ok(None);
        }
        let blobs = chunks
            .iter()
            .map(|chunk| self.dimension.encode(&chunk.embedding))
            .collect::<Result<Vec<_>, _>>()?;

        with_savepoint(self.conn, "insert_chunks", || {
            let mut stmt = self
                .conn
                .prepare_cached(
                    "INSERT INTO note_chunks (document_name, document_path, text_chunk, embedding)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(StoreError::transaction("insert chunks"))?;

            let mut first = None;
            let mut last = None;
            for (chunk, blob) in chunks.iter().zip(&blobs) {
                let id = stmt
                    .insert(params![document_name, document_path, chunk.text, blob])
                    .map_err(StoreError::transaction("insert chunks"))?;
                first.get_or_insert(id);
                last = Some(id);
            }

            first
                .zip(last)
                .and_then(|(first, last)| RowRange::new(RowId::new(first)?, RowId::new(last)?))
                .ok_or_else(|| StoreError::Schema {
                    reason: "note_chunks assigned a non-positive row id".to_string(),
                })
        })
        .map(Some)
    }

    /// Delete every chunk of a document, returning the removed row ids in
    /// ascending order. Unknown documents remove nothing.
    pub fn delete_by_document(&self, document_name: &str) -> StoreResult<Vec<RowId>> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM note_chunks WHERE document_name = ?1 RETURNING id")
            .map_err(StoreError::transaction("delete chunks"))?;
        let mut ids = stmt
            .query_map(params![document_name], |row| row.get::<_, i64>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(StoreError::transaction("delete chunks"))?
            .into_iter()
            .filter_map(RowId::new)
            .collect::<Vec<_>>();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Row ids currently stored for a document, ascending.
    pub fn document_row_ids(&self, document_name: &str) -> StoreResult<Vec<RowId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM note_chunks WHERE document_name = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![document_name], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().filter_map(RowId::new).collect())
    }

    pub fn list_document_names(&self) -> StoreResult<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT document_name FROM note_chunks")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }

    pub fn count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM note_chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_for_document(&self, document_name: &str) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM note_chunks WHERE document_name = ?1",
            params![document_name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Path stored for a document, if it has any chunks.
    pub fn document_path(&self, document_name: &str) -> StoreResult<Option<String>> {
        let path = self
            .conn
            .query_row(
                "SELECT document_path FROM note_chunks WHERE document_name = ?1 LIMIT 1",
                params![document_name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(path)
    }

    /// Remove every chunk. Row ids keep counting up afterwards.
    pub fn reset_all(&self) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM note_chunks", [])
            .map_err(StoreError::transaction("reset chunks"))?;
        Ok(())
    }

    /// All chunks of a document in insertion order.
    pub fn document_rows(&self, document_name: &str) -> StoreResult<Vec<Chunk>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{SELECT_CHUNK} WHERE document_name = ?1 ORDER BY id"))?;
        let raw = stmt
            .query_map(params![document_name], read_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(|r| self.decode(r)).collect()
    }

    /// Look up rows by id, keeping the order of `ids`. Ids without a row are
    /// skipped.
    pub fn rows_by_ids(&self, ids: &[RowId]) -> StoreResult<Vec<Chunk>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{SELECT_CHUNK} WHERE id = ?1"))?;
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(raw) = stmt.query_row(params![id.get()], read_raw).optional()? {
                rows.push(self.decode(raw)?);
            }
        }
        Ok(rows)
    }

    /// Row id and embedding of every stored chunk, ordered by row id.
    pub fn snapshot(&self) -> StoreResult<Vec<IndexEntry>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, embedding FROM note_chunks ORDER BY id")?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(id, blob)| {
                Ok(IndexEntry {
                    row_id: row_id(id)?,
                    embedding: self.dimension.decode(&blob)?,
                })
            })
            .collect()
    }

    fn decode(&self, (id, document_name, document_path, text, blob): RawChunk) -> StoreResult<Chunk> {
        Ok(Chunk {
            row_id: row_id(id)?,
            document_name,
            document_path,
            text,
            embedding: self.dimension.decode(&blob)?,
        })
    }
}

impl Chunk {
    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            row_id: self.row_id,
            embedding: self.embedding.clone(),
        }
    }
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChunk> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn row_id(id: i64) -> StoreResult<RowId> {
    RowId::new(id).ok_or_else(|| StoreError::Schema {
        reason: format!("note_chunks contains invalid row id {id}"),
    })
}
