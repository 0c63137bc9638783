/// The main library module for notevault
pub mod chunking;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod io;
pub mod storage;
pub mod vector;
pub mod workspace;

// Explicit exports for better API clarity
pub use chunking::{ChunkSplitter, ChunkingOptions};
pub use config::{EmbedRequest, EngineConfig, QueryRequest, Settings};
pub use engine::{BatchReport, DocumentInput, IndexInfo, IndexScope, QueryHit, VectorStoreEngine};
pub use error::{StoreError, StoreResult};
pub use vector::{EmbeddingGenerator, HashEmbeddingGenerator, RowId, VectorDimension};
