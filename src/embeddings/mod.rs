// Embeddings module
// Document chunking, the embedding seam and the Ollama client behind it

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{
    ChunkingConfig, ContentChunk, Metadata, MetadataValue, TextSplitter, chunk_document,
    sanitize_metadata,
};
pub use ollama::OllamaClient;

/// Turns text into fixed-length vectors.
///
/// Documents and queries go through separate calls since some models embed
/// them differently; every vector from one embedder has the same length.
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}
