//! Provider failures, timeouts and store binding errors.

use std::sync::Arc;
use std::time::Duration;

use notevault::chunking::ChunkingOptions;
use notevault::config::EngineConfig;
use notevault::engine::{DocumentInput, VectorStoreEngine};
use notevault::vector::{EmbeddingGenerator, HashEmbeddingGenerator, VectorDimension};
use notevault::StoreError;
use tempfile::TempDir;

use crate::support::{FailingGenerator, SlowGenerator, config, open_with};

#[test]
fn test_provider_failure_leaves_document_without_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_with(temp_dir.path(), Arc::new(FailingGenerator::new("BROKEN")));

    let doc = DocumentInput::new("a.md", "a.md", "fine text");
    engine.embed_document(&doc, ChunkingOptions::default()).unwrap();
    assert_eq!(engine.document_chunk_count("a.md").unwrap(), 1);

    let err = engine
        .embed_document(
            &DocumentInput::new("a.md", "a.md", "BROKEN text"),
            ChunkingOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Provider(_)));
    assert_eq!(engine.document_chunk_count("a.md").unwrap(), 0);
    assert!(!engine.info().unwrap().is_drifted());

    // Embedding again repairs the document
    engine.embed_document(&doc, ChunkingOptions::default()).unwrap();
    assert_eq!(engine.document_chunk_count("a.md").unwrap(), 1);
}

#[test]
fn test_provider_timeout_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(SlowGenerator::new("SLOW", Duration::from_secs(3)));
    let engine =
        VectorStoreEngine::open(config(temp_dir.path()).with_timeout_secs(1), provider).unwrap();

    engine
        .embed_document(&DocumentInput::new("a.md", "a.md", "quick"), ChunkingOptions::default())
        .unwrap();

    let err = engine
        .embed_document(&DocumentInput::new("a.md", "a.md", "SLOW"), ChunkingOptions::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::ProviderTimeout { seconds: 1 }));
    assert_eq!(engine.document_chunk_count("a.md").unwrap(), 0);
    assert_eq!(engine.info().unwrap().chunk_count, 0);
}

#[test]
fn test_batch_continues_past_failed_documents() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_with(temp_dir.path(), Arc::new(FailingGenerator::new("BROKEN")));

    let documents = vec![
        DocumentInput::new("ok.md", "ok.md", "plain"),
        DocumentInput::new("bad.md", "bad.md", "BROKEN"),
        DocumentInput::new("also-ok.md", "also-ok.md", "also plain"),
    ];
    let report = engine
        .embed_batch(&documents, ChunkingOptions::default())
        .unwrap();

    assert_eq!(report.embedded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "bad.md");
    assert_eq!(report.failed[0].status_code, "PROVIDER_ERROR");
    assert_eq!(engine.info().unwrap().chunk_count, 2);
}

#[test]
fn test_reopen_with_other_dimension_fails() {
    let temp_dir = TempDir::new().unwrap();
    {
        let provider: Arc<dyn EmbeddingGenerator> = Arc::new(HashEmbeddingGenerator::default());
        let engine = open_with(temp_dir.path(), provider);
        engine
            .embed_document(&DocumentInput::new("a.md", "a.md", "text"), ChunkingOptions::default())
            .unwrap();
    }

    let narrow = HashEmbeddingGenerator::new(VectorDimension::new(128).unwrap());
    let err = VectorStoreEngine::open(config(temp_dir.path()), Arc::new(narrow)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::DimensionMismatch {
            expected: 384,
            actual: 128
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_reopen_with_other_model_fails() {
    let temp_dir = TempDir::new().unwrap();
    drop(open_with(
        temp_dir.path(),
        Arc::new(HashEmbeddingGenerator::default()),
    ));

    let mut config = config(temp_dir.path());
    config.model = "counting".to_string();
    let err = VectorStoreEngine::open(config, Arc::new(RenamedGenerator::default())).unwrap_err();
    assert!(matches!(err, StoreError::ModelMismatch { .. }));
}

#[test]
fn test_invalid_engine_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = EngineConfig::new("hash", temp_dir.path().join("store.db"))
        .with_chunking(ChunkingOptions::new(50, 80));
    let err =
        VectorStoreEngine::open(config, Arc::new(HashEmbeddingGenerator::default())).unwrap_err();
    assert!(matches!(err, StoreError::Chunking(_)));
    assert!(!temp_dir.path().join("store.db").exists());
}

/// Same vectors as the hash backend under another model name.
#[derive(Default)]
struct RenamedGenerator {
    inner: HashEmbeddingGenerator,
}

impl EmbeddingGenerator for RenamedGenerator {
    fn generate_embeddings(
        &self,
        texts: &[&str],
    ) -> Result<Vec<Vec<f32>>, notevault::vector::VectorError> {
        self.inner.generate_embeddings(texts)
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        "counting"
    }
}
