//! Shared fixtures for the integration tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use notevault::config::EngineConfig;
use notevault::vector::{EmbeddingGenerator, HashEmbeddingGenerator, VectorDimension, VectorError};
use notevault::VectorStoreEngine;

/// Hash embeddings that count how often the provider is called.
#[derive(Default)]
pub struct CountingGenerator {
    inner: HashEmbeddingGenerator,
    calls: AtomicUsize,
}

impl CountingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingGenerator for CountingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate_embeddings(texts)
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Fails every call whose texts mention `trigger`.
pub struct FailingGenerator {
    inner: HashEmbeddingGenerator,
    trigger: &'static str,
}

impl FailingGenerator {
    pub fn new(trigger: &'static str) -> Self {
        Self {
            inner: HashEmbeddingGenerator::default(),
            trigger,
        }
    }
}

impl EmbeddingGenerator for FailingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.iter().any(|text| text.contains(self.trigger)) {
            return Err(VectorError::EmbeddingFailed("model unavailable".to_string()));
        }
        self.inner.generate_embeddings(texts)
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Sleeps before answering calls that mention `trigger`.
pub struct SlowGenerator {
    inner: HashEmbeddingGenerator,
    trigger: &'static str,
    delay: Duration,
}

impl SlowGenerator {
    pub fn new(trigger: &'static str, delay: Duration) -> Self {
        Self {
            inner: HashEmbeddingGenerator::default(),
            trigger,
            delay,
        }
    }
}

impl EmbeddingGenerator for SlowGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.iter().any(|text| text.contains(self.trigger)) {
            std::thread::sleep(self.delay);
        }
        self.inner.generate_embeddings(texts)
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

pub fn config(dir: &Path) -> EngineConfig {
    EngineConfig::new(HashEmbeddingGenerator::MODEL_ID, dir.join("store.db"))
        .with_workspace_root(dir)
}

pub fn open_with(dir: &Path, provider: Arc<dyn EmbeddingGenerator>) -> VectorStoreEngine {
    VectorStoreEngine::open(config(dir), provider).expect("open store")
}

/// Engine plus a handle on its counting provider.
pub fn open_counting(dir: &Path) -> (VectorStoreEngine, Arc<CountingGenerator>) {
    let provider = Arc::new(CountingGenerator::default());
    let engine = open_with(dir, provider.clone());
    (engine, provider)
}
