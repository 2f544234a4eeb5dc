// LanceDB vector database module
// Handles vector storage and similarity search for chunk embeddings


pub mod vector_store;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::{ContentChunk, Metadata};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding
    pub id: String,
    /// The vector embedding; every record in one index has the same length
    pub vector: Vec<f32>,
    /// Metadata about the chunk this embedding represents
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// The actual text content of the chunk
    pub content: String,
    /// Path of the source document
    pub source: String,
    /// 1-based page number
    pub page: u32,
    /// Offset of the chunk within its page, in chars
    pub offset: u32,
    /// Position of this chunk within the document (insertion order)
    pub chunk_index: u32,
    /// Sanitized page metadata as a JSON object
    pub metadata_json: String,
    /// Timestamp when this embedding was created
    pub created_at: String,
}

impl EmbeddingRecord {
    /// Pair a chunk with its embedding
    #[inline]
    pub fn from_chunk(chunk: &ContentChunk, vector: Vec<f32>) -> Result<Self> {
        let metadata_json =
            serde_json::to_string(&chunk.metadata).context("Failed to serialize chunk metadata")?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            metadata: ChunkMetadata {
                content: chunk.content.clone(),
                source: chunk.source.clone(),
                page: chunk.page,
                offset: u32::try_from(chunk.offset).context("Chunk offset out of range")?,
                chunk_index: u32::try_from(chunk.chunk_index)
                    .context("Chunk index out of range")?,
                metadata_json,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        })
    }
}

impl ChunkMetadata {
    /// Decode the stored page metadata
    #[inline]
    pub fn metadata(&self) -> Result<Metadata> {
        serde_json::from_str(&self.metadata_json).context("Failed to parse stored chunk metadata")
    }
}
