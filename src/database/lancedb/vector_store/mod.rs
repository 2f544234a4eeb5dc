
use super::{ChunkMetadata, EmbeddingRecord};
use crate::retrieval::{RetrievedChunk, VectorIndex};
use crate::{ChatPdfError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const TABLE_NAME: &str = "chunks";
const STAGING_SUFFIX: &str = ".staging";
const BACKUP_SUFFIX: &str = ".previous";

/// Columns every stored index must carry, besides the vector
const REQUIRED_COLUMNS: [(&str, DataType); 7] = [
    ("id", DataType::Utf8),
    ("content", DataType::Utf8),
    ("source", DataType::Utf8),
    ("page", DataType::UInt32),
    ("offset", DataType::UInt32),
    ("chunk_index", DataType::UInt32),
    ("metadata_json", DataType::Utf8),
];

/// Persistent chunk index backed by a LanceDB directory
pub struct VectorStore {
    table: Table,
    path: PathBuf,
    vector_dimension: usize,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_metadata: ChunkMetadata,
    /// `1 - distance`, higher is better
    pub similarity_score: f32,
    /// Cosine distance reported by LanceDB
    pub distance: f32,
}

impl VectorStore {
    /// Whether `path` holds something that could be an index: an existing,
    /// non-empty directory
    #[inline]
    pub fn exists(path: &Path) -> bool {
        std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
    }

    /// Write a fresh index at `path` holding exactly `records`.
    ///
    /// The records are committed in a single write into a staging directory
    /// next to `path`, which then takes the place of any previous index. A
    /// failed write leaves the previous index untouched.
    #[inline]
    pub async fn create(path: &Path, records: &[EmbeddingRecord]) -> Result<Self> {
        let vector_dimension = records
            .first()
            .map(|r| r.vector.len())
            .ok_or_else(|| ChatPdfError::Database("No embeddings to store".to_string()))?;
        if vector_dimension == 0 {
            return Err(ChatPdfError::Database(
                "Embeddings must not be empty".to_string(),
            ));
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dimension) {
            return Err(ChatPdfError::Database(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                vector_dimension,
                bad.vector.len()
            )));
        }

        let staging = sibling_path(path, STAGING_SUFFIX);
        if let Err(e) = Self::write_table(&staging, records, vector_dimension).await {
            error!("Failed to write index at {:?}: {}", path, e);
            if let Err(cleanup_err) = Self::delete(&staging).await {
                warn!("Failed to remove staging directory: {}", cleanup_err);
            }
            return Err(e);
        }

        Self::swap_in(&staging, path).await?;

        let table = Self::connect(path)
            .await?
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| ChatPdfError::Database(format!("Failed to open written table: {}", e)))?;

        info!(
            "Stored {} embeddings ({} dimensions) at {:?}",
            records.len(),
            vector_dimension,
            path
        );

        Ok(Self {
            table,
            path: path.to_path_buf(),
            vector_dimension,
        })
    }

    async fn write_table(
        location: &Path,
        records: &[EmbeddingRecord],
        vector_dimension: usize,
    ) -> Result<()> {
        if location.is_dir() {
            debug!("Removing stale staging directory {:?}", location);
            tokio::fs::remove_dir_all(location).await?;
        }
        tokio::fs::create_dir_all(location).await.map_err(|e| {
            ChatPdfError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let record_batch = Self::create_record_batch(records, vector_dimension)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        Self::connect(location)
            .await?
            .create_table(TABLE_NAME, reader)
            .execute()
            .await
            .map_err(|e| ChatPdfError::Database(format!("Failed to insert embeddings: {}", e)))?;

        Ok(())
    }

    /// Move a fully written `staging` directory to `path`, restoring the
    /// previous index if the move fails
    async fn swap_in(staging: &Path, path: &Path) -> Result<()> {
        let backup = sibling_path(path, BACKUP_SUFFIX);
        if backup.is_dir() {
            tokio::fs::remove_dir_all(&backup).await?;
        }

        let had_previous = path.exists();
        if had_previous {
            tokio::fs::rename(path, &backup).await?;
        }

        if let Err(e) = tokio::fs::rename(staging, path).await {
            if had_previous {
                if let Err(restore_err) = tokio::fs::rename(&backup, path).await {
                    error!("Failed to restore previous index: {}", restore_err);
                }
            }
            return Err(ChatPdfError::Database(format!(
                "Failed to move new index into place: {}",
                e
            )));
        }

        if had_previous {
            if let Err(e) = tokio::fs::remove_dir_all(&backup).await {
                warn!("Failed to remove previous index at {:?}: {}", backup, e);
            }
        }
        Ok(())
    }

    /// Open a previously persisted index.
    ///
    /// A missing directory, a missing table, an unexpected schema or an empty
    /// table all fail with [`ChatPdfError::StorageLoad`].
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_counted(path).await.map(|(store, _)| store)
    }

    /// [`VectorStore::open`], also returning the number of stored chunks
    #[inline]
    pub async fn open_counted(path: &Path) -> Result<(Self, u64)> {
        if !Self::exists(path) {
            return Err(ChatPdfError::StorageLoad(format!(
                "No index found at {}",
                path.display()
            )));
        }

        let connection = Self::connect(path)
            .await
            .map_err(|e| ChatPdfError::StorageLoad(e.to_string()))?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ChatPdfError::StorageLoad(format!("Failed to list tables: {}", e)))?;
        if !table_names.iter().any(|name| name == TABLE_NAME) {
            return Err(ChatPdfError::StorageLoad(format!(
                "{} does not contain a chunk index",
                path.display()
            )));
        }

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| ChatPdfError::StorageLoad(format!("Failed to open table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| ChatPdfError::StorageLoad(format!("Failed to get table schema: {}", e)))?;
        let vector_dimension = Self::check_schema(&schema)?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| ChatPdfError::StorageLoad(format!("Failed to count rows: {}", e)))?;
        if rows == 0 {
            return Err(ChatPdfError::StorageLoad(format!(
                "Index at {} is empty",
                path.display()
            )));
        }

        info!(
            "Opened index at {:?} with {} embeddings ({} dimensions)",
            path, rows, vector_dimension
        );

        let store = Self {
            table,
            path: path.to_path_buf(),
            vector_dimension,
        };
        Ok((store, rows as u64))
    }

    /// Remove a persisted index directory. Missing directories are fine.
    #[inline]
    pub async fn delete(path: &Path) -> Result<bool> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                info!("Deleted index at {:?}", path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No index to delete at {:?}", path);
                Ok(false)
            }
            Err(e) => Err(ChatPdfError::Io(e)),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn connect(path: &Path) -> Result<Connection> {
        let uri = format!("file://{}", path.display());
        debug!("Connecting to LanceDB at {}", uri);

        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| ChatPdfError::Database(format!("Failed to connect to LanceDB: {}", e)))
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("page", DataType::UInt32, false),
            Field::new("offset", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("metadata_json", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Vector dimension of a stored table, if its schema is one we wrote
    fn check_schema(schema: &Schema) -> Result<usize> {
        let vector_dimension = match schema.field_with_name("vector").map(Field::data_type) {
            Ok(DataType::FixedSizeList(item, size)) if item.data_type() == &DataType::Float32 => {
                usize::try_from(*size).ok().filter(|d| *d > 0)
            }
            _ => None,
        }
        .ok_or_else(|| {
            ChatPdfError::StorageLoad("Incompatible index: missing vector column".to_string())
        })?;

        for (name, data_type) in &REQUIRED_COLUMNS {
            match schema.field_with_name(name) {
                Ok(field) if field.data_type() == data_type => {}
                Ok(field) => {
                    return Err(ChatPdfError::StorageLoad(format!(
                        "Incompatible index: column {} has type {}",
                        name,
                        field.data_type()
                    )));
                }
                Err(_) => {
                    return Err(ChatPdfError::StorageLoad(format!(
                        "Incompatible index: missing column {}",
                        name
                    )));
                }
            }
        }

        Ok(vector_dimension)
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(
        records: &[EmbeddingRecord],
        vector_dim: usize,
    ) -> Result<RecordBatch> {
        let len = records.len();
        let list_size = i32::try_from(vector_dim).map_err(|_| {
            ChatPdfError::Database(format!("Vector dimension {} is too large", vector_dim))
        })?;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut contents = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut pages = Vec::with_capacity(len);
        let mut offsets = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut metadata_jsons = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            contents.push(record.metadata.content.as_str());
            sources.push(record.metadata.source.as_str());
            pages.push(record.metadata.page);
            offsets.push(record.metadata.offset);
            chunk_indices.push(record.metadata.chunk_index);
            metadata_jsons.push(record.metadata.metadata_json.as_str());
            created_ats.push(record.metadata.created_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, list_size, Arc::new(values_array), None).map_err(
                |e| ChatPdfError::Database(format!("Failed to create vector array: {}", e)),
            )?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(pages)),
            Arc::new(UInt32Array::from(offsets)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(metadata_jsons)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(list_size), arrays)
            .map_err(|e| ChatPdfError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest stored chunks to `query_vector` by cosine distance
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if query_vector.len() != self.vector_dimension {
            return Err(ChatPdfError::Database(format!(
                "Query dimension {} does not match index dimension {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| {
                ChatPdfError::Database(format!("Failed to create vector search: {}", e))
            })?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| ChatPdfError::Database(format!("Failed to execute search: {}", e)))?;

        Self::parse_search_results_stream(results).await
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| ChatPdfError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let contents = column::<StringArray>(batch, "content")?;
        let sources = column::<StringArray>(batch, "source")?;
        let pages = column::<UInt32Array>(batch, "page")?;
        let offsets = column::<UInt32Array>(batch, "offset")?;
        let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
        let metadata_jsons = column::<StringArray>(batch, "metadata_json")?;
        let created_ats = column::<StringArray>(batch, "created_at")?;
        let distances = column::<Float32Array>(batch, "_distance")?;

        let results = (0..batch.num_rows())
            .map(|row| {
                let distance = if distances.is_null(row) {
                    f32::NAN
                } else {
                    distances.value(row)
                };

                SearchResult {
                    chunk_metadata: ChunkMetadata {
                        content: contents.value(row).to_string(),
                        source: sources.value(row).to_string(),
                        page: pages.value(row),
                        offset: offsets.value(row),
                        chunk_index: chunk_indices.value(row),
                        metadata_json: metadata_jsons.value(row).to_string(),
                        created_at: created_ats.value(row).to_string(),
                    },
                    similarity_score: 1.0 - distance,
                    distance,
                }
            })
            .collect();

        Ok(results)
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64> {
        let count = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| ChatPdfError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }
}

/// `path` with `suffix` appended to its final component
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ChatPdfError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ChatPdfError::Database(format!("Invalid {} column type", name)))
}

#[async_trait]
impl VectorIndex for VectorStore {
    #[inline]
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>> {
        let results = self.search_similar(query, limit).await?;

        Ok(results
            .into_iter()
            .map(|r| RetrievedChunk {
                content: r.chunk_metadata.content,
                similarity: r.similarity_score,
                page: r.chunk_metadata.page,
                chunk_index: r.chunk_metadata.chunk_index,
            })
            .collect())
    }

    #[inline]
    async fn count(&self) -> Result<u64> {
        self.count_embeddings().await
    }
}
