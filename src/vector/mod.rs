//! Embeddings and similarity search for note chunks.
//!
//! # Architecture
//! An [`EmbeddingGenerator`] turns chunk text into fixed-dimension vectors.
//! Vectors are persisted twice: alongside their text in the chunk table, and
//! in the [`SimilarityIndex`], which answers nearest-neighbor queries by row
//! id. The engine keeps the two mirrored.

mod embedding;
mod index;
mod types;

#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, HashEmbeddingGenerator, default_models_dir,
    embed_with_timeout, model_to_string, parse_embedding_model,
};
pub use index::{IndexEntry, SimilarityIndex};
pub use types::{
    Distance, RowId, RowRange, VECTOR_DIMENSION_384, VectorDimension, VectorError, l2_distance,
};
