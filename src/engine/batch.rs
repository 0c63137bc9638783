//! Bulk embedding across many documents.
//!
//! A batch removes every target document's chunks in one pass, then embeds
//! documents group by group: the provider calls of a group run in parallel,
//! the writes run one document at a time. Each document commits on its own,
//! so an interrupted batch is repaired by running it again.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::Serialize;

use super::{DocumentInput, VectorStoreEngine};
use crate::chunking::{ChunkSplitter, ChunkingOptions};
use crate::error::{StoreError, StoreResult};

/// Chunks and vectors for one document, ready to be written.
type Prepared = Option<(Vec<String>, Vec<Vec<f32>>)>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedDocument {
    pub name: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDocument {
    pub name: String,
    pub status_code: String,
    pub message: String,
}

/// Outcome of [`VectorStoreEngine::embed_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub embedded: Vec<EmbeddedDocument>,
    /// Documents whose text produced no chunks
    pub skipped_empty: Vec<String>,
    /// Documents that failed on their own; their old chunks are gone
    pub failed: Vec<FailedDocument>,
}

impl BatchReport {
    pub fn chunk_total(&self) -> usize {
        self.embedded.iter().map(|doc| doc.chunks).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record_failure(&mut self, name: &str, error: &StoreError) {
        tracing::warn!("skipping {name}: {error}");
        self.failed.push(FailedDocument {
            name: name.to_string(),
            status_code: error.status_code(),
            message: error.to_string(),
        });
    }
}

impl VectorStoreEngine {
    /// Embed many documents.
    ///
    /// Write durability is relaxed for the duration of the call. Failures
    /// confined to one document (unreadable file, provider error or timeout)
    /// are recorded in the report and the batch moves on; storage failures
    /// abort it.
    pub fn embed_batch(
        &self,
        documents: &[DocumentInput],
        options: ChunkingOptions,
    ) -> StoreResult<BatchReport> {
        self.embed_batch_with_progress(documents, options, |_| {})
    }

    /// [`embed_batch`](Self::embed_batch), calling `on_document` with each
    /// document name once it is done.
    pub fn embed_batch_with_progress(
        &self,
        documents: &[DocumentInput],
        options: ChunkingOptions,
        mut on_document: impl FnMut(&str),
    ) -> StoreResult<BatchReport> {
        let splitter = self.splitter(options)?;
        let documents = dedup_by_name(documents);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.parallel_threads)
            .thread_name(|i| format!("notevault-batch-{i}"))
            .build()
            .map_err(|e| StoreError::Config {
                reason: format!("cannot start batch workers: {e}"),
            })?;

        let db = self.db.lock();
        let conn = db.connection();
        let _durability = db.relaxed_durability()?;

        let tx = conn
            .unchecked_transaction()
            .map_err(StoreError::transaction("delete documents"))?;
        let mut removed = 0;
        for document in &documents {
            removed += self.remove_document(&tx, &document.name)?;
        }
        tx.commit()
            .map_err(StoreError::transaction("delete documents"))?;
        tracing::debug!(
            "batch removed {removed} old chunks of {} documents",
            documents.len()
        );

        let mut report = BatchReport::default();
        for group in documents.chunks(self.config.batch_documents.max(1)) {
            let prepared: Vec<StoreResult<Prepared>> = pool.install(|| {
                group
                    .par_iter()
                    .map(|document| self.prepare(document, &splitter))
                    .collect()
            });

            for (document, result) in group.iter().zip(prepared) {
                match result {
                    Ok(Some((texts, embeddings))) => {
                        let chunks = self.store_chunks(conn, document, texts, embeddings)?;
                        report.embedded.push(EmbeddedDocument {
                            name: document.name.clone(),
                            chunks,
                        });
                    }
                    Ok(None) => report.skipped_empty.push(document.name.clone()),
                    Err(e) if e.is_document_level() => report.record_failure(&document.name, &e),
                    Err(e) => return Err(e),
                }
                on_document(&document.name);
            }
        }

        tracing::info!(
            "batch embedded {} documents ({} chunks), {} empty, {} failed",
            report.embedded.len(),
            report.chunk_total(),
            report.skipped_empty.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn prepare(&self, document: &DocumentInput, splitter: &ChunkSplitter) -> StoreResult<Prepared> {
        let content = self.resolve_content(document)?;
        self.chunk_and_embed(&document.name, &content, splitter)
    }
}

/// Keep the last submission of each document name, in submission order.
fn dedup_by_name(documents: &[DocumentInput]) -> Vec<&DocumentInput> {
    let mut seen = HashSet::new();
    let mut unique: Vec<&DocumentInput> = documents
        .iter()
        .rev()
        .filter(|document| seen.insert(document.name.as_str()))
        .collect();
    unique.reverse();

    if unique.len() < documents.len() {
        tracing::warn!(
            "batch named {} documents more than once, using the last submission of each",
            documents.len() - unique.len()
        );
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::vector::{EmbeddingGenerator, MockEmbeddingGenerator};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn engine(temp_dir: &TempDir) -> VectorStoreEngine {
        let provider: Arc<dyn EmbeddingGenerator> = Arc::new(MockEmbeddingGenerator::new());
        let config = EngineConfig::new("mock", temp_dir.path().join("store.db"))
            .with_workspace_root(temp_dir.path());
        VectorStoreEngine::open(config, provider).unwrap()
    }

    #[test]
    fn test_batch_reports_each_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let documents = vec![
            DocumentInput::new("a.md", "a.md", "garden plant ".repeat(20)),
            DocumentInput::new("empty.md", "empty.md", ""),
            DocumentInput::from_path("missing.md"),
            DocumentInput::new("b.md", "b.md", "meeting agenda"),
        ];

        let mut seen = Vec::new();
        let report = engine
            .embed_batch_with_progress(&documents, ChunkingOptions::new(100, 10), |name| {
                seen.push(name.to_string())
            })
            .unwrap();

        assert_eq!(report.embedded.len(), 2);
        assert_eq!(report.skipped_empty, vec!["empty.md"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "missing.md");
        assert_eq!(report.failed[0].status_code, "FILE_READ_ERROR");
        assert!(!report.is_clean());
        assert_eq!(seen.len(), 4);

        let info = engine.info().unwrap();
        assert_eq!(info.chunk_count, report.chunk_total());
        assert!(!info.is_drifted());
    }

    #[test]
    fn test_batch_replaces_previous_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);
        let doc = DocumentInput::new("a.md", "a.md", "x".repeat(250));

        engine.embed_batch(&[doc.clone()], ChunkingOptions::new(100, 0)).unwrap();
        assert_eq!(engine.document_chunk_count("a.md").unwrap(), 3);

        let shorter = DocumentInput::new("a.md", "a.md", "x".repeat(150));
        engine.embed_batch(&[shorter], ChunkingOptions::new(100, 0)).unwrap();
        assert_eq!(engine.document_chunk_count("a.md").unwrap(), 2);
        assert_eq!(engine.info().unwrap().index_size, 2);
    }

    #[test]
    fn test_duplicate_names_keep_last_submission() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);
        let documents = vec![
            DocumentInput::new("a.md", "a.md", "x".repeat(300)),
            DocumentInput::new("b.md", "b.md", "y"),
            DocumentInput::new("a.md", "a.md", "z"),
        ];

        let report = engine
            .embed_batch(&documents, ChunkingOptions::new(100, 0))
            .unwrap();
        let names: Vec<_> = report.embedded.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["b.md", "a.md"]);
        assert_eq!(engine.document_chunk_count("a.md").unwrap(), 1);
    }

    #[test]
    fn test_batch_restores_durability() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);
        engine
            .embed_batch(
                &[DocumentInput::new("a.md", "a.md", "garden")],
                ChunkingOptions::default(),
            )
            .unwrap();

        let db = engine.db.lock();
        let mode: String = db
            .connection()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "delete");
    }

    #[test]
    fn test_rejected_chunking_aborts_before_any_change() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);
        engine
            .embed_document(
                &DocumentInput::new("a.md", "a.md", "garden"),
                ChunkingOptions::default(),
            )
            .unwrap();

        let err = engine
            .embed_batch(
                &[DocumentInput::new("a.md", "a.md", "garden")],
                ChunkingOptions::new(5, 7),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Chunking(_)));
        assert_eq!(engine.document_chunk_count("a.md").unwrap(), 1);
    }
}
