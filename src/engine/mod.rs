//! Orchestration of the chunk table and the similarity index.
//!
//! [`VectorStoreEngine`] is the only writer of a store. Every operation takes
//! the engine's lock for its whole duration, so the delete, insert and index
//! steps of different documents never interleave. Chunk rows and index
//! entries are kept mirrored procedurally; [`IndexScope::Full`] rebuilds the
//! index from the chunk table and repairs any drift.
//!
//! Embedding a document moves through these stages:
//!
//! ```text
//! Idle -> DeletingOld -> Chunking -> Embedding -> Inserting -> Indexing -> Idle
//! ```
//!
//! The old chunks are removed in one savepoint; the new rows and their
//! index entries are committed together in a second one. A provider or
//! insert failure in between leaves the document with no chunks until it is
//! embedded again.

mod batch;

pub use batch::{BatchReport, EmbeddedDocument, FailedDocument};

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;

use crate::chunking::{ChunkSplitter, ChunkingOptions};
use crate::config::{EmbedRequest, EngineConfig, QueryRequest};
use crate::error::{StoreError, StoreResult};
use crate::storage::{ChunkStore, NewChunk, StoreDatabase, with_savepoint};
use crate::vector::{
    EmbeddingGenerator, IndexEntry, RowId, SimilarityIndex, VectorDimension, VectorError,
    embed_with_timeout, model_to_string, parse_embedding_model,
};
use crate::workspace;

/// A document submitted for embedding.
///
/// Documents are identified by `name`; `path` is stored alongside the chunks
/// and used to read the text when `content` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInput {
    pub name: String,
    pub path: String,
    pub content: Option<String>,
}

impl DocumentInput {
    pub fn new(name: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            content: Some(content.into()),
        }
    }

    /// A document read from disk, named by its workspace-relative path.
    pub fn from_path(relative_path: impl Into<String>) -> Self {
        let path = relative_path.into();
        Self {
            name: path.clone(),
            path,
            content: None,
        }
    }
}

/// Which part of the index [`VectorStoreEngine::update_index`] touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexScope {
    /// Index this document's chunks that are not indexed yet
    Document(String),
    /// Clear the index and rebuild it from every stored chunk
    Full,
}

/// Sizes of the two mirrored structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub index_size: usize,
    pub chunk_count: usize,
}

impl IndexInfo {
    /// The index and the chunk table disagree; run a full index update.
    pub fn is_drifted(&self) -> bool {
        self.index_size != self.chunk_count
    }
}

/// One query result joined back to its chunk row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub row_id: RowId,
    pub document_name: String,
    pub document_path: String,
    pub text: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
enum EmbedStage {
    DeletingOld,
    Chunking,
    Embedding,
    Inserting,
    Indexing,
}

/// Single-writer engine over one store file.
pub struct VectorStoreEngine {
    db: Mutex<StoreDatabase>,
    provider: Arc<dyn EmbeddingGenerator>,
    dimension: VectorDimension,
    config: EngineConfig,
}

impl std::fmt::Debug for VectorStoreEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreEngine")
            .field("model", &self.provider.model_id())
            .field("dimension", &self.dimension)
            .field("store_path", &self.config.store_path)
            .finish()
    }
}

impl VectorStoreEngine {
    /// Configure a store: open (or create) the file, create the schema and
    /// bind it to the provider's model and dimension.
    ///
    /// # Errors
    /// Fails when `config.model` does not name the provider's model, when the
    /// store was created for another model or dimension, or when the schema
    /// cannot be created.
    pub fn open(config: EngineConfig, provider: Arc<dyn EmbeddingGenerator>) -> StoreResult<Self> {
        config.validate()?;
        if !model_matches(provider.model_id(), &config.model) {
            return Err(StoreError::ModelMismatch {
                stored: provider.model_id().to_string(),
                requested: config.model.clone(),
            });
        }

        let dimension = provider.dimension();
        let db = StoreDatabase::open(&config.store_path)?;
        db.bind_embedding(dimension, provider.model_id())?;
        ChunkStore::new(db.connection(), dimension).create_schema()?;
        SimilarityIndex::new(db.connection(), dimension).create_schema()?;

        tracing::info!(
            "configured store {} for model {} ({dimension} dimensions)",
            config.store_path.display(),
            provider.model_id()
        );

        Ok(Self {
            db: Mutex::new(db),
            provider,
            dimension,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    pub fn store_path(&self) -> &Path {
        &self.config.store_path
    }

    /// Replace a document's chunks with chunks of its current text.
    ///
    /// `options` override the configured chunking defaults field by field.
    /// Returns the number of chunks written; empty text writes none.
    pub fn embed_document(
        &self,
        document: &DocumentInput,
        options: ChunkingOptions,
    ) -> StoreResult<usize> {
        let splitter = self.splitter(options)?;
        let db = self.db.lock();
        let conn = db.connection();

        let content = self.resolve_content(document)?;

        stage(&document.name, EmbedStage::DeletingOld);
        self.warn_on_path_change(conn, document)?;
        let removed = self.remove_document(conn, &document.name)?;

        let Some((texts, embeddings)) = self.chunk_and_embed(&document.name, &content, &splitter)?
        else {
            tracing::info!(
                "{}: no text to embed ({removed} old chunks removed)",
                document.name
            );
            return Ok(0);
        };

        let written = self.store_chunks(conn, document, texts, embeddings)?;
        tracing::info!("embedded {} ({written} chunks)", document.name);
        Ok(written)
    }

    /// [`embed_document`](Self::embed_document) driven by a request record.
    pub fn embed_request(&self, request: &EmbedRequest) -> StoreResult<usize> {
        self.check_model(request.model.as_deref())?;
        self.embed_document(&request.document(), request.chunking())
    }

    /// Remove a document's index entries, then its chunks.
    ///
    /// Unknown documents are a no-op. Returns the number of chunks removed.
    pub fn delete_document_embedding(&self, document_name: &str) -> StoreResult<usize> {
        let db = self.db.lock();
        let removed = self.remove_document(db.connection(), document_name)?;
        if removed > 0 {
            tracing::info!("deleted {document_name} ({removed} chunks)");
        } else {
            tracing::debug!("delete of unknown document {document_name} ignored");
        }
        Ok(removed)
    }

    /// Bring the index in line with the chunk table.
    ///
    /// Returns the number of index entries written.
    pub fn update_index(&self, scope: IndexScope) -> StoreResult<usize> {
        let db = self.db.lock();
        let tx = db
            .connection()
            .unchecked_transaction()
            .map_err(StoreError::transaction("update index"))?;
        let chunks = ChunkStore::new(&tx, self.dimension);
        let index = SimilarityIndex::new(&tx, self.dimension);

        let written = match &scope {
            IndexScope::Document(name) => {
                let entries: Vec<IndexEntry> = chunks
                    .document_rows(name)?
                    .iter()
                    .map(|chunk| chunk.index_entry())
                    .collect();
                index.index_missing(&entries)?
            }
            IndexScope::Full => {
                let snapshot = chunks.snapshot()?;
                index.rebuild_all(&snapshot)?
            }
        };
        tx.commit().map_err(StoreError::transaction("update index"))?;

        match scope {
            IndexScope::Document(name) => {
                tracing::debug!("indexed {written} new entries for {name}");
            }
            IndexScope::Full => tracing::info!("rebuilt index with {written} entries"),
        }
        Ok(written)
    }

    /// The `k` chunks nearest to `text`, closest first.
    ///
    /// Blank text or `k == 0` returns nothing without calling the provider.
    /// Index entries whose chunk row is gone are dropped from the result.
    pub fn query(&self, text: &str, k: usize) -> StoreResult<Vec<QueryHit>> {
        if text.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let db = self.db.lock();
        let conn = db.connection();

        let embedding = self
            .embed(vec![text.to_string()])?
            .pop()
            .ok_or_else(|| {
                StoreError::from_provider(VectorError::BatchLength {
                    expected: 1,
                    actual: 0,
                })
            })?;

        let matches = SimilarityIndex::new(conn, self.dimension).search(&embedding, k)?;
        let ids: Vec<RowId> = matches.iter().map(|(id, _)| *id).collect();
        let mut rows: HashMap<RowId, _> = ChunkStore::new(conn, self.dimension)
            .rows_by_ids(&ids)?
            .into_iter()
            .map(|chunk| (chunk.row_id, chunk))
            .collect();

        let hits: Vec<QueryHit> = matches
            .into_iter()
            .filter_map(|(row_id, distance)| {
                rows.remove(&row_id).map(|chunk| QueryHit {
                    row_id,
                    document_name: chunk.document_name,
                    document_path: chunk.document_path,
                    text: chunk.text,
                    distance: distance.get(),
                })
            })
            .collect();

        if hits.len() < ids.len() {
            tracing::debug!(
                "dropped {} index entries without chunk rows",
                ids.len() - hits.len()
            );
        }
        Ok(hits)
    }

    /// [`query`](Self::query) driven by a request record; `default_k`
    /// applies when the request carries no count.
    pub fn query_request(
        &self,
        request: &QueryRequest,
        default_k: usize,
    ) -> StoreResult<Vec<QueryHit>> {
        self.check_model(request.model.as_deref())?;
        self.query(&request.text, request.k.unwrap_or(default_k))
    }

    /// Current sizes of the index and the chunk table.
    pub fn info(&self) -> StoreResult<IndexInfo> {
        let db = self.db.lock();
        let conn = db.connection();
        let info = IndexInfo {
            index_size: SimilarityIndex::new(conn, self.dimension).count()?,
            chunk_count: ChunkStore::new(conn, self.dimension).count()?,
        };
        if info.is_drifted() {
            tracing::warn!(
                "index drift: {} index entries for {} chunks, run a full index update",
                info.index_size,
                info.chunk_count
            );
        }
        Ok(info)
    }

    /// Empty both structures. Row ids keep counting up afterwards.
    pub fn reset(&self) -> StoreResult<()> {
        let db = self.db.lock();
        let tx = db
            .connection()
            .unchecked_transaction()
            .map_err(StoreError::transaction("reset"))?;
        SimilarityIndex::new(&tx, self.dimension).clear()?;
        ChunkStore::new(&tx, self.dimension).reset_all()?;
        tx.commit().map_err(StoreError::transaction("reset"))?;
        tracing::info!("store reset");
        Ok(())
    }

    pub fn list_document_names(&self) -> StoreResult<BTreeSet<String>> {
        let db = self.db.lock();
        ChunkStore::new(db.connection(), self.dimension).list_document_names()
    }

    /// Chunks currently stored for one document.
    pub fn document_chunk_count(&self, document_name: &str) -> StoreResult<usize> {
        let db = self.db.lock();
        ChunkStore::new(db.connection(), self.dimension).count_for_document(document_name)
    }

    fn splitter(&self, options: ChunkingOptions) -> StoreResult<ChunkSplitter> {
        Ok(options.or(self.config.chunking).splitter()?)
    }

    fn check_model(&self, requested: Option<&str>) -> StoreResult<()> {
        match requested {
            Some(requested) if !model_matches(self.provider.model_id(), requested) => {
                Err(StoreError::ModelMismatch {
                    stored: self.provider.model_id().to_string(),
                    requested: requested.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn embed(&self, texts: Vec<String>) -> StoreResult<Vec<Vec<f32>>> {
        embed_with_timeout(&self.provider, texts, self.timeout()).map_err(StoreError::from_provider)
    }

    fn resolve_content<'d>(&self, document: &'d DocumentInput) -> StoreResult<Cow<'d, str>> {
        match &document.content {
            Some(content) => Ok(Cow::Borrowed(content.as_str())),
            None => workspace::read_document(
                self.config.workspace_root.as_deref(),
                Path::new(&document.path),
            )
            .map(Cow::Owned),
        }
    }

    /// Split and embed; `None` when the text produces no chunks.
    fn chunk_and_embed(
        &self,
        name: &str,
        content: &str,
        splitter: &ChunkSplitter,
    ) -> StoreResult<Option<(Vec<String>, Vec<Vec<f32>>)>> {
        stage(name, EmbedStage::Chunking);
        let texts = splitter.split(content);
        if texts.is_empty() {
            return Ok(None);
        }
        stage(name, EmbedStage::Embedding);
        let embeddings = self.embed(texts.clone())?;
        Ok(Some((texts, embeddings)))
    }

    /// Insert a document's chunks and index exactly the new row range,
    /// all-or-nothing.
    fn store_chunks(
        &self,
        conn: &Connection,
        document: &DocumentInput,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> StoreResult<usize> {
        let new_chunks: Vec<NewChunk> = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| NewChunk { text, embedding })
            .collect();

        with_savepoint(conn, "store_document", || {
            stage(&document.name, EmbedStage::Inserting);
            let Some(range) = ChunkStore::new(conn, self.dimension).insert_chunks(
                &document.name,
                &document.path,
                &new_chunks,
            )?
            else {
                return Ok(0);
            };

            stage(&document.name, EmbedStage::Indexing);
            let entries: Vec<IndexEntry> = range
                .iter()
                .zip(&new_chunks)
                .map(|(row_id, chunk)| IndexEntry {
                    row_id,
                    embedding: chunk.embedding.clone(),
                })
                .collect();
            SimilarityIndex::new(conn, self.dimension).index_missing(&entries)?;
            Ok(range.len())
        })
    }

    /// Delete a document's index entries, then its chunk rows, all-or-nothing.
    fn remove_document(&self, conn: &Connection, document_name: &str) -> StoreResult<usize> {
        with_savepoint(conn, "remove_document", || {
            let chunks = ChunkStore::new(conn, self.dimension);
            let ids = chunks.document_row_ids(document_name)?;
            if ids.is_empty() {
                return Ok(0);
            }
            SimilarityIndex::new(conn, self.dimension).delete_rows(&ids)?;
            Ok(chunks.delete_by_document(document_name)?.len())
        })
    }

    fn warn_on_path_change(&self, conn: &Connection, document: &DocumentInput) -> StoreResult<()> {
        if let Some(stored) = ChunkStore::new(conn, self.dimension).document_path(&document.name)? {
            if stored != document.path {
                tracing::warn!(
                    "{} was stored from {stored}, now replaced by {}",
                    document.name,
                    document.path
                );
            }
        }
        Ok(())
    }
}

fn stage(document: &str, stage: EmbedStage) {
    tracing::debug!("{document}: {stage:?}");
}

/// Whether `requested` names the provider's model, accepting any alias the
/// model parser understands.
fn model_matches(provider_model: &str, requested: &str) -> bool {
    requested == provider_model
        || parse_embedding_model(requested)
            .map(|model| model_to_string(&model) == provider_model)
            .unwrap_or(false)
}
