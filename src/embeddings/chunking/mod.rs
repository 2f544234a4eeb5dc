
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ConfigError;
use crate::document::Document;

/// Scalar-only metadata attached to a chunk
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A metadata value the vector index can store as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Represents a chunk of a document ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChunk {
    /// The chunk text
    pub content: String,
    /// Path of the source document
    pub source: String,
    /// 1-based page number the chunk was cut from
    pub page: u32,
    /// Offset of the first character of the chunk within its page, in chars
    pub offset: usize,
    /// Position of this chunk within the document, in insertion order
    pub chunk_index: usize,
    /// Sanitized page metadata
    pub metadata: Metadata,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub max_chunk_size: usize,
    /// Number of characters repeated between adjacent chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 1024,
            overlap: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk_size == 0 {
            return Err(ConfigError::InvalidMaxChunkSize(self.max_chunk_size));
        }
        if self.overlap >= self.max_chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.overlap,
                self.max_chunk_size,
            ));
        }
        Ok(())
    }
}

/// A borrowed window of the input text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan<'a> {
    pub text: &'a str,
    /// Offset of the span within the input, in chars
    pub offset: usize,
}

/// Fixed-window character splitter.
///
/// Lengths are measured in Unicode scalar values (`char`), never bytes, so a
/// span never cuts a multi-byte character in half. Every span except the last
/// holds exactly `max_chunk_size` chars and starts `max_chunk_size - overlap`
/// chars after the previous one, so neighbours share exactly `overlap` chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    max_chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    #[inline]
    pub fn new(max_chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        ChunkingConfig {
            max_chunk_size,
            overlap,
        }
        .validate()?;

        Ok(Self {
            max_chunk_size,
            overlap,
        })
    }

    #[inline]
    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        Self::new(config.max_chunk_size, config.overlap)
    }

    #[inline]
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily split `text`. Calling `split` again starts over from the
    /// beginning of the input.
    #[inline]
    pub fn split<'a>(&self, text: &'a str) -> Splits<'a> {
        Splits {
            rest: text,
            offset: 0,
            max_chunk_size: self.max_chunk_size,
            step: self.max_chunk_size - self.overlap,
            finished: text.is_empty(),
        }
    }
}

/// Iterator over the spans produced by [`TextSplitter::split`]
#[derive(Debug, Clone)]
pub struct Splits<'a> {
    rest: &'a str,
    offset: usize,
    max_chunk_size: usize,
    step: usize,
    finished: bool,
}

impl<'a> Iterator for Splits<'a> {
    type Item = TextSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let end = byte_offset_of_char(self.rest, self.max_chunk_size);
        let (window, _) = self.rest.split_at(end);
        let span = TextSpan {
            text: window,
            offset: self.offset,
        };

        if end == self.rest.len() {
            self.finished = true;
        } else {
            let (_, next) = self.rest.split_at(byte_offset_of_char(self.rest, self.step));
            self.rest = next;
            self.offset += self.step;
        }

        Some(span)
    }
}

impl std::iter::FusedIterator for Splits<'_> {}

/// Byte index of the `n`th char of `text`, or `text.len()` past the end
fn byte_offset_of_char(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}

/// Split every page of a document into embedding-ready chunks.
///
/// Pages are split independently; an empty or whitespace-only page yields
/// nothing, so an empty document yields an empty vector.
#[inline]
pub fn chunk_document(document: &Document, splitter: &TextSplitter) -> Vec<ContentChunk> {
    let source = document.source.display().to_string();
    let mut chunks = Vec::new();

    for page in &document.pages {
        if page.text.trim().is_empty() {
            continue;
        }

        let metadata = sanitize_metadata(&page.metadata);
        for span in splitter.split(&page.text) {
            chunks.push(ContentChunk {
                content: span.text.to_string(),
                source: source.clone(),
                page: page.number,
                offset: span.offset,
                chunk_index: chunks.len(),
                metadata: metadata.clone(),
            });
        }
    }

    debug!(
        "Chunked '{}' ({} pages) into {} chunks",
        source,
        document.pages.len(),
        chunks.len()
    );

    chunks
}

/// Keep only scalar metadata values; arrays, objects and nulls are dropped
#[inline]
pub fn sanitize_metadata(raw: &Map<String, Value>) -> Metadata {
    let mut metadata = Metadata::new();

    for (key, value) in raw {
        let scalar = match value {
            Value::Bool(b) => Some(MetadataValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(MetadataValue::Integer)
                .or_else(|| n.as_f64().map(MetadataValue::Float)),
            Value::String(s) => Some(MetadataValue::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        };

        match scalar {
            Some(scalar) => {
                metadata.insert(key.clone(), scalar);
            }
            None => debug!("Dropping non-scalar metadata field '{}'", key),
        }
    }

    metadata
}
