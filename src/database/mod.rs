// Database module
// Persistent vector index for document chunks, stored with LanceDB

pub mod lancedb;

pub use self::lancedb::vector_store::{SearchResult, VectorStore};
pub use self::lancedb::{ChunkMetadata, EmbeddingRecord};
