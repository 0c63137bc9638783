//! Embedding generation for chunk text.
//!
//! The store consumes embeddings as a pure function `text -> vector`. This
//! module defines that contract ([`EmbeddingGenerator`]), the fastembed-backed
//! production implementation, a deterministic hashing implementation for
//! offline use, and [`embed_with_timeout`], which bounds the latency of a
//! single provider call.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::vector::{VectorDimension, VectorError};

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe, return exactly one vector per input
/// text in input order, and be deterministic for a fixed model identifier.
/// Batching is a throughput optimization only.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Identifier of the model behind this generator, recorded in the store.
    #[must_use]
    fn model_id(&self) -> &str;
}

/// Parse a model identifier into a fastembed model.
///
/// Accepts the fastembed variant names used in settings files as well as the
/// Hugging Face style names the note plugins send (`Xenova/all-MiniLM-L6-v2`).
pub fn parse_embedding_model(model_id: &str) -> Result<EmbeddingModel, VectorError> {
    let normalized = model_id
        .rsplit('/')
        .next()
        .unwrap_or(model_id)
        .to_ascii_lowercase()
        .replace(['-', '_', '.'], "");

    match normalized.as_str() {
        "allminilml6v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "allminilml12v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bgesmallenv15" => Ok(EmbeddingModel::BGESmallENV15),
        "bgebaseenv15" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomicembedtextv15" => Ok(EmbeddingModel::NomicEmbedTextV15),
        _ => Err(VectorError::UnknownModel(model_id.to_string())),
    }
}

/// Canonical identifier for a fastembed model.
#[must_use]
pub fn model_to_string(model: &EmbeddingModel) -> String {
    match model {
        EmbeddingModel::AllMiniLML6V2 => "AllMiniLML6V2",
        EmbeddingModel::AllMiniLML12V2 => "AllMiniLML12V2",
        EmbeddingModel::BGESmallENV15 => "BGESmallENV15",
        EmbeddingModel::BGEBaseENV15 => "BGEBaseENV15",
        EmbeddingModel::NomicEmbedTextV15 => "NomicEmbedTextV15",
        _ => "unsupported",
    }
    .to_string()
}

/// Default directory for downloaded model files.
#[must_use]
pub fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notevault")
        .join("models")
}

/// FastEmbed implementation of [`EmbeddingGenerator`].
///
/// The dimension is probed from the loaded model rather than assumed, so the
/// store can validate it against the dimension recorded at schema creation.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    model_id: String,
}

impl FastEmbedGenerator {
    /// Load a model by identifier, downloading it into `cache_dir` on first use.
    ///
    /// # Errors
    /// Returns an error if the identifier is unknown or the model fails to
    /// initialize or download.
    pub fn new(model_id: &str, cache_dir: &Path) -> Result<Self, VectorError> {
        let model = parse_embedding_model(model_id)?;
        let canonical = model_to_string(&model);

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        let probe = text_model
            .embed(vec!["test"], None)
            .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| VectorError::EmbeddingFailed("Model returned no embedding".into()))?;

        tracing::debug!("loaded embedding model {canonical} ({dimension} dimensions)");

        Ok(Self {
            model: Mutex::new(text_model),
            dimension: VectorDimension::new(dimension)?,
            model_id: canonical,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Deterministic hashing generator.
///
/// Produces L2-normalized pseudo-random vectors seeded by the text, so equal
/// texts always map to equal vectors. It carries no semantics; it exists for
/// tests and for running the store without a model download.
#[derive(Debug, Clone)]
pub struct HashEmbeddingGenerator {
    dimension: VectorDimension,
    model_id: String,
}

impl HashEmbeddingGenerator {
    pub const MODEL_ID: &'static str = "hash";

    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            model_id: Self::MODEL_ID.to_string(),
        }
    }
}

impl Default for HashEmbeddingGenerator {
    fn default() -> Self {
        Self::new(VectorDimension::dimension_384())
    }
}

impl EmbeddingGenerator for HashEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts
            .iter()
            .map(|text| hash_embed(text, self.dimension.get()))
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn hash_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let mantissa = ((bits >> 32) as u32) >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Run one provider call with a bounded wait.
///
/// The call runs on a dedicated thread; when `timeout` expires the caller gets
/// [`VectorError::Timeout`] immediately and the worker's eventual result is
/// discarded. On success the output is checked for one vector per input and
/// for the provider's declared dimension.
pub fn embed_with_timeout(
    provider: &Arc<dyn EmbeddingGenerator>,
    texts: Vec<String>,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, VectorError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let expected = texts.len();
    let worker = Arc::clone(provider);
    let (tx, rx) = crossbeam_channel::bounded(1);

    std::thread::Builder::new()
        .name("notevault-embed".to_string())
        .spawn(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            // Receiver may already be gone after a timeout
            let _ = tx.send(worker.generate_embeddings(&refs));
        })
        .map_err(|e| VectorError::EmbeddingFailed(format!("Failed to spawn embed worker: {e}")))?;

    let embeddings = match rx.recv_timeout(timeout) {
        Ok(result) => result?,
        Err(RecvTimeoutError::Timeout) => return Err(VectorError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            return Err(VectorError::EmbeddingFailed(
                "Embedding worker exited without a result (provider panicked?)".to_string(),
            ));
        }
    };

    if embeddings.len() != expected {
        return Err(VectorError::BatchLength {
            expected,
            actual: embeddings.len(),
        });
    }
    let dimension = provider.dimension();
    for embedding in &embeddings {
        dimension.validate_vector(embedding)?;
    }

    Ok(embeddings)
}

/// Mock embedding generator for testing.
///
/// Generates deterministic embeddings based on keywords in the text so tests
/// can reason about which chunks land closest to a query.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl Default for MockEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    /// Create a new mock generator with standard 384 dimensions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::dimension_384(),
        }
    }

    /// Create a generator with custom dimension for testing.
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        let mut embeddings = Vec::new();

        for text in texts {
            let mut embedding = vec![0.1; dim];

            if (text.contains("garden") || text.contains("plant")) && dim > 1 {
                embedding[0] = 0.9;
                embedding[1] = 0.8;
            }
            if (text.contains("recipe") || text.contains("cook")) && dim > 3 {
                embedding[2] = 0.85;
                embedding[3] = 0.75;
            }
            if (text.contains("meeting") || text.contains("agenda")) && dim > 5 {
                embedding[4] = 0.8;
                embedding[5] = 0.7;
            }

            normalize(&mut embedding);
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}
