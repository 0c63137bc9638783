//! Similarity index over chunk embeddings.
//!
//! Entries are keyed by the chunk table's row ids and stored in their own
//! table inside the same store file. Search is exact: every entry is scored
//! by Euclidean distance and the best `k` are kept in a bounded heap.
//!
//! # Re-insertion
//!
//! [`SimilarityIndex::insert_rows`] rejects ids that are already indexed with
//! [`VectorError::DuplicateRow`] and writes nothing. Callers that may overlap
//! existing entries use [`SimilarityIndex::index_missing`], which skips them.

use std::collections::BinaryHeap;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{StoreError, StoreResult};
use crate::storage::schema::{CREATE_INDEX_SQL, PROBE_INDEX_SQL};
use crate::storage::with_savepoint;
use crate::vector::{Distance, RowId, VectorDimension, VectorError, l2_distance};

/// Row id plus embedding, the unit the index stores.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub row_id: RowId,
    pub embedding: Vec<f32>,
}

/// Exact nearest-neighbor index over a borrowed connection.
pub struct SimilarityIndex<'conn> {
    conn: &'conn Connection,
    dimension: VectorDimension,
}

impl<'conn> SimilarityIndex<'conn> {
    pub fn new(conn: &'conn Connection, dimension: VectorDimension) -> Self {
        Self { conn, dimension }
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Create the index table if missing. Safe to call on an existing store.
    pub fn create_schema(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(CREATE_INDEX_SQL)
            .and_then(|()| self.conn.prepare(PROBE_INDEX_SQL).map(|_| ()))
            .map_err(|e| StoreError::Schema {
                reason: format!("chunk_index: {e}"),
            })
    }

    /// Index every entry. Fails without writing anything if any row id is
    /// already present (or repeated within `entries`).
    pub fn insert_rows(&self, entries: &[IndexEntry]) -> StoreResult<usize> {
        let blobs = self.encode_all(entries)?;
        with_savepoint(self.conn, "index_insert", || {
            let mut stmt = self
                .conn
                .prepare_cached("INSERT INTO chunk_index (row_id, embedding) VALUES (?1, ?2)")
                .map_err(StoreError::transaction("index insert"))?;
            for (entry, blob) in entries.iter().zip(&blobs) {
                if self.contains(entry.row_id)? {
                    return Err(VectorError::DuplicateRow(entry.row_id).into());
                }
                stmt.execute(params![entry.row_id.get(), blob])
                    .map_err(StoreError::transaction("index insert"))?;
            }
            Ok(entries.len())
        })
    }

    /// Index the entries whose row ids are not present yet. Returns the
    /// number written.
    pub fn index_missing(&self, entries: &[IndexEntry]) -> StoreResult<usize> {
        let blobs = self.encode_all(entries)?;
        with_savepoint(self.conn, "index_missing", || {
            let mut stmt = self
                .conn
                .prepare_cached(
                    "INSERT OR IGNORE INTO chunk_index (row_id, embedding) VALUES (?1, ?2)",
                )
                .map_err(StoreError::transaction("index insert"))?;
            let mut written = 0;
            for (entry, blob) in entries.iter().zip(&blobs) {
                written += stmt
                    .execute(params![entry.row_id.get(), blob])
                    .map_err(StoreError::transaction("index insert"))?;
            }
            Ok(written)
        })
    }

    /// Remove entries. Absent ids are ignored. Returns the number removed.
    pub fn delete_rows(&self, row_ids: &[RowId]) -> StoreResult<usize> {
        with_savepoint(self.conn, "index_delete", || {
            let mut stmt = self
                .conn
                .prepare_cached("DELETE FROM chunk_index WHERE row_id = ?1")
                .map_err(StoreError::transaction("index delete"))?;
            let mut removed = 0;
            for id in row_ids {
                removed += stmt
                    .execute(params![id.get()])
                    .map_err(StoreError::transaction("index delete"))?;
            }
            Ok(removed)
        })
    }

    /// Replace the whole index with `snapshot`.
    ///
    /// Safe at any time, including on an empty store. Returns the number of
    /// entries written.
    pub fn rebuild_all(&self, snapshot: &[IndexEntry]) -> StoreResult<usize> {
        with_savepoint(self.conn, "index_rebuild", || {
            self.clear()?;
            self.insert_rows(snapshot)
        })
    }

    /// The `k` entries closest to `query`, ascending by distance. Equal
    /// distances are ordered by row id.
    pub fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<(RowId, Distance)>> {
        self.dimension.validate_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        // `k` is caller input; the heap never holds more than the index does
        let capacity = k.min(self.count()?).saturating_add(1);

        let mut stmt = self
            .conn
            .prepare_cached("SELECT row_id, embedding FROM chunk_index")?;
        let mut rows = stmt.query([])?;

        // Max-heap on (distance, row id): the top is the worst candidate kept
        let mut heap: BinaryHeap<(Distance, RowId)> = BinaryHeap::with_capacity(capacity);
        while let Some(row) = rows.next()? {
            let raw_id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let Some(row_id) = RowId::new(raw_id) else {
                tracing::warn!("skipping index entry with invalid row id {raw_id}");
                continue;
            };
            let embedding = self.dimension.decode(&blob)?;
            let distance = Distance::new(l2_distance(query, &embedding))?;

            heap.push((distance, row_id));
            if heap.len() > k {
                heap.pop();
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|(distance, row_id)| (row_id, distance))
            .collect())
    }

    pub fn count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunk_index", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn contains(&self, row_id: RowId) -> StoreResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM chunk_index WHERE row_id = ?1",
                params![row_id.get()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Remove every entry.
    pub fn clear(&self) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM chunk_index", [])
            .map_err(StoreError::transaction("index clear"))?;
        Ok(())
    }

    fn encode_all(&self, entries: &[IndexEntry]) -> Result<Vec<Vec<u8>>, VectorError> {
        entries
            .iter()
            .map(|entry| self.dimension.encode(&entry.embedding))
            .collect()
    }
}
