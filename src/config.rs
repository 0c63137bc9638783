//! Configuration module for the note vector store.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `NV_` and use double underscores
//! to separate nested levels:
//! - `NV_CHUNKING__CHUNK_SIZE=800` sets `chunking.chunk_size`
//! - `NV_EMBEDDING__BACKEND=hash` sets `embedding.backend`
//! - `NV_QUERY__RESULT_COUNT=5` sets `query.result_count`
//!
//! Request records ([`EngineConfig`], [`EmbedRequest`], [`QueryRequest`]) are
//! strict: unknown fields are rejected when they are deserialized.

use crate::chunking::{ChunkingOptions, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::engine::DocumentInput;
use crate::error::{StoreError, StoreResult};
use crate::vector::{
    EmbeddingGenerator, FastEmbedGenerator, HashEmbeddingGenerator, default_models_dir,
};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the per-workspace directory holding settings and the store file.
pub const CONFIG_DIR: &str = ".notevault";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Store file location
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Default chunking parameters
    #[serde(default = "default_chunking")]
    pub chunking: ChunkingOptions,

    /// Query defaults
    #[serde(default)]
    pub query: QueryConfig,

    /// Which files a workspace scan picks up
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Path to the store file, relative paths resolve against the workspace root
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Base directory documents are read from (automatically detected)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
}

/// Which [`EmbeddingGenerator`](crate::vector::EmbeddingGenerator) to build.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// fastembed ONNX models
    #[default]
    Fastembed,
    /// Deterministic hashing, no model download
    Hash,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Upper bound for a single provider call in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Documents embedded in parallel during a batch
    #[serde(default = "default_batch_documents")]
    pub batch_documents: usize,

    /// Worker threads for batch embedding
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Model download directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryConfig {
    /// Results returned when a query does not ask for a count
    #[serde(default = "default_result_count")]
    pub result_count: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkspaceConfig {
    /// File extensions collected by a workspace scan
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names never descended into
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_store_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("semantic_search.db")
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_batch_documents() -> usize {
    16
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_chunking() -> ChunkingOptions {
    ChunkingOptions::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
}
fn default_result_count() -> usize {
    10
}
fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}
fn default_skip_dirs() -> Vec<String> {
    vec![
        ".obsidian".to_string(),
        ".trash".to_string(),
        CONFIG_DIR.to_string(),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: default_chunking(),
            query: QueryConfig::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            workspace_root: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            backend: EmbeddingBackend::default(),
            timeout_secs: default_timeout_secs(),
            batch_documents: default_batch_documents(),
            parallel_threads: default_parallel_threads(),
            cache_dir: None,
        }
    }
}

impl EmbeddingConfig {
    /// Model identifier the store is bound to; the hash backend has its own.
    pub fn model_id(&self) -> &str {
        match self.backend {
            EmbeddingBackend::Fastembed => &self.model,
            EmbeddingBackend::Hash => HashEmbeddingGenerator::MODEL_ID,
        }
    }

    /// Build the configured provider. Loading a fastembed model may download
    /// it into `cache_dir` first.
    pub fn create_generator(&self) -> StoreResult<Arc<dyn EmbeddingGenerator>> {
        match self.backend {
            EmbeddingBackend::Fastembed => {
                let cache_dir = self.cache_dir.clone().unwrap_or_else(default_models_dir);
                let generator = FastEmbedGenerator::new(&self.model, &cache_dir)
                    .map_err(StoreError::from_provider)?;
                Ok(Arc::new(generator))
            }
            EmbeddingBackend::Hash => Ok(Arc::new(HashEmbeddingGenerator::default())),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            result_count: default_result_count(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            skip_dirs: default_skip_dirs(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .notevault directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.store.workspace_root.is_none() {
                    settings.store.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("NV_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the workspace config by looking for .notevault directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .notevault is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Store file path with relative paths resolved against the workspace root.
    pub fn store_path(&self) -> PathBuf {
        match &self.store.workspace_root {
            Some(root) if self.store.path.is_relative() => root.join(&self.store.path),
            _ => self.store.path.clone(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    /// Create a default settings file under `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let threads = num_cpus::get();
        let template = format!(
            r#"# notevault configuration file

# Version of the configuration schema
version = 1

[store]
# Store file holding chunks and the similarity index (relative to the workspace root)
path = "{CONFIG_DIR}/semantic_search.db"

[embedding]
# Model identifier: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, NomicEmbedTextV15
model = "AllMiniLML6V2"

# "fastembed" loads the model above, "hash" embeds offline without semantics
backend = "fastembed"

# Seconds to wait for a single embedding call (first use downloads the model)
timeout_secs = 120

# Documents embedded in parallel during embed-batch
batch_documents = 16

# Worker threads for embed-batch (defaults to the number of CPUs)
parallel_threads = {threads}

[chunking]
# Characters per chunk
chunk_size = {DEFAULT_CHUNK_SIZE}

# Characters shared by consecutive chunks, must be smaller than chunk_size
chunk_overlap = {DEFAULT_CHUNK_OVERLAP}

[query]
# Results returned when -k is not given
result_count = 10

[workspace]
# Extensions picked up by embed-batch
extensions = ["md"]

# Directories never scanned
skip_dirs = [".obsidian", ".trash", "{CONFIG_DIR}"]
"#
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}

/// Everything [`VectorStoreEngine::open`](crate::engine::VectorStoreEngine::open)
/// needs besides the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Model identifier the store is bound to
    pub model: String,

    /// Store file location
    pub store_path: PathBuf,

    /// Base directory for documents submitted without content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub chunking: ChunkingOptions,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_documents")]
    pub batch_documents: usize,

    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

impl EngineConfig {
    pub fn new(model: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            store_path: store_path.into(),
            workspace_root: None,
            chunking: ChunkingOptions::default(),
            timeout_secs: default_timeout_secs(),
            batch_documents: default_batch_documents(),
            parallel_threads: default_parallel_threads(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.embedding.model_id().to_string(),
            store_path: settings.store_path(),
            workspace_root: settings.store.workspace_root.clone(),
            chunking: settings.chunking,
            timeout_secs: settings.embedding.timeout_secs,
            batch_documents: settings.embedding.batch_documents,
            parallel_threads: settings.embedding.parallel_threads,
        }
    }

    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, chunking: ChunkingOptions) -> Self {
        self.chunking = chunking;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.model.trim().is_empty() {
            return Err(StoreError::Config {
                reason: "model identifier is empty".to_string(),
            });
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(StoreError::Config {
                reason: "store path is empty".to_string(),
            });
        }
        if self.parallel_threads == 0 {
            return Err(StoreError::Config {
                reason: "parallel_threads must be greater than zero".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(StoreError::Config {
                reason: "timeout_secs must be greater than zero".to_string(),
            });
        }
        self.chunking.splitter()?;
        Ok(())
    }
}

/// Request to embed one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbedRequest {
    pub document_name: String,
    pub document_path: String,

    /// Inline text; when absent the file at `document_path` is read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_overlap: Option<usize>,

    /// Must name the store's model when given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl EmbedRequest {
    pub fn document(&self) -> DocumentInput {
        DocumentInput {
            name: self.document_name.clone(),
            path: self.document_path.clone(),
            content: self.content.clone(),
        }
    }

    pub fn chunking(&self) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

/// Request for the nearest chunks to a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    pub text: String,

    /// Result count, the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
