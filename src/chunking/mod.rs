//! Text chunking for note documents.

mod splitter;

pub use splitter::{
    ChunkSplitter, ChunkingError, ChunkingOptions, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
