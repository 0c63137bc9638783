//! Persistent storage for note chunks.

mod chunks;
mod database;
pub mod metadata_keys;
pub mod schema;

pub use chunks::{Chunk, ChunkStore, NewChunk};
pub use database::{Durability, RelaxedDurability, StoreDatabase, with_savepoint};
pub use metadata_keys::MetadataKey;
