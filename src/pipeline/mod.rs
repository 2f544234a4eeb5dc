// Pipeline module
// Owns the ingest -> retrieve -> generate lifecycle for a single document


use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{EmbeddingRecord, VectorStore};
use crate::document::{self, Document};
use crate::embeddings::{ContentChunk, Embedder, OllamaClient, TextSplitter, chunk_document};
use crate::generation::{Generator, PromptAssembler};
use crate::retrieval::{RetrievedChunk, Retriever, VectorIndex};
use crate::{ChatPdfError, Result};

/// Answer given to any question while no document is loaded
pub const NO_DOCUMENT_MESSAGE: &str = "No document found! Please add a PDF first.";

/// How the live index came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Opened from a previously persisted index
    Loaded,
    /// Written by an ingest in this session
    Built,
}

impl fmt::Display for IndexOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => f.write_str("loaded"),
            Self::Built => f.write_str("built"),
        }
    }
}

/// Observable lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    Building,
    Ready { origin: IndexOrigin, entries: u64 },
}

/// Summary of a completed ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: PathBuf,
    pub pages: usize,
    /// Zero when the document had no extractable text
    pub chunks: usize,
}

struct ReadyIndex {
    origin: IndexOrigin,
    entries: u64,
    location: PathBuf,
    retriever: Retriever,
}

enum Stage {
    Empty,
    Building,
    Ready(ReadyIndex),
}

/// Question answering over one PDF.
///
/// Operations take `&mut self` and run to completion one at a time. The
/// pipeline is `Empty` until an ingest or load succeeds and goes back to
/// `Empty` on [`Pipeline::clear`].
pub struct Pipeline {
    config: Config,
    splitter: TextSplitter,
    assembler: PromptAssembler,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    stage: Stage,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration and explicit model
    /// bindings
    #[inline]
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ChatPdfError::Config(e.to_string()))?;

        let splitter = TextSplitter::from_config(&config.chunking)
            .map_err(|e| ChatPdfError::Config(e.to_string()))?;
        let template = config
            .prompt_template()
            .map_err(|e| ChatPdfError::Config(e.to_string()))?;

        Ok(Self {
            config,
            splitter,
            assembler: PromptAssembler::new(template),
            embedder,
            generator,
            stage: Stage::Empty,
        })
    }

    /// Pipeline backed by the Ollama server named in the configuration, used
    /// for both embeddings and answers
    #[inline]
    pub fn with_ollama(config: Config) -> Result<Self> {
        let client = Arc::new(OllamaClient::new(&config)?);
        let embedder: Arc<dyn Embedder> = Arc::clone(&client) as Arc<dyn Embedder>;
        Self::new(config, embedder, client)
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> PipelineState {
        match &self.stage {
            Stage::Empty => PipelineState::Empty,
            Stage::Building => PipelineState::Building,
            Stage::Ready(ready) => PipelineState::Ready {
                origin: ready.origin,
                entries: ready.entries,
            },
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.stage, Stage::Ready(_))
    }

    /// Load, chunk and embed the PDF at `path` and write a fresh index to the
    /// configured storage location.
    ///
    /// Only valid while empty. Any failure leaves the pipeline empty. A PDF
    /// without extractable text is not an error: any stored index is removed,
    /// nothing new is written and the pipeline stays empty.
    #[inline]
    pub async fn ingest(&mut self, path: &Path) -> Result<IngestReport> {
        self.ensure_empty("ingest")?;

        info!("Ingesting {:?}", path);
        let document = document::load_pdf(path)
            .map_err(|e| ChatPdfError::Ingestion(format!("{e:#}")))?;

        self.ingest_document(document).await
    }

    /// Same as [`Pipeline::ingest`] for an already loaded document
    #[inline]
    pub async fn ingest_document(&mut self, document: Document) -> Result<IngestReport> {
        self.ensure_empty("ingest")?;

        self.stage = Stage::Building;
        match self.build_index(&document).await {
            Ok((chunks, ready)) => {
                self.stage = ready.map_or(Stage::Empty, Stage::Ready);
                Ok(IngestReport {
                    source: document.source,
                    pages: document.pages.len(),
                    chunks,
                })
            }
            Err(e) => {
                warn!("Ingest of {:?} failed: {}", document.source, e);
                self.stage = Stage::Empty;
                Err(e)
            }
        }
    }

    async fn build_index(&self, document: &Document) -> Result<(usize, Option<ReadyIndex>)> {
        let chunks = chunk_document(document, &self.splitter);
        if chunks.is_empty() {
            warn!(
                "{:?} contains no extractable text, nothing to index",
                document.source
            );
            // The previous document must not outlive its replacement
            VectorStore::delete(&self.config.index_path())
                .await
                .map_err(|e| ChatPdfError::Ingestion(format!("Failed to remove old index: {e}")))?;
            return Ok((0, None));
        }

        let vectors = self.embed_chunks(&chunks).await?;

        let records = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord::from_chunk(chunk, vector))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|e| ChatPdfError::Ingestion(format!("{e:#}")))?;

        let location = self.config.index_path();
        let store = VectorStore::create(&location, &records)
            .await
            .map_err(|e| ChatPdfError::Ingestion(format!("Failed to write index: {e}")))?;

        info!(
            "Indexed {} chunks from {:?} at {:?}",
            records.len(),
            document.source,
            location
        );

        let ready = self.ready_index(store, IndexOrigin::Built, records.len() as u64, location);
        Ok((records.len(), Some(ready)))
    }

    async fn embed_chunks(&self, chunks: &[ContentChunk]) -> Result<Vec<Vec<f32>>> {
        let batch_size = usize::try_from(self.config.ollama.batch_size)
            .unwrap_or(1)
            .max(1);

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedder = Arc::clone(&self.embedder);

            let embedded = tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
                .await
                .map_err(|e| ChatPdfError::Ingestion(format!("Embedding task failed: {e}")))?
                .map_err(|e| ChatPdfError::Ingestion(format!("Failed to embed chunks: {e:#}")))?;

            if embedded.len() != batch.len() {
                bar.abandon();
                return Err(ChatPdfError::Ingestion(format!(
                    "Embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                )));
            }

            vectors.extend(embedded);
            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} chunks", vectors.len(), chunks.len());
        }
        bar.finish_and_clear();

        Ok(vectors)
    }

    /// Open the index persisted at `location`.
    ///
    /// Only valid while empty. A missing, corrupt or incompatible index fails
    /// with [`ChatPdfError::StorageLoad`] and leaves the pipeline empty.
    #[inline]
    pub async fn load_existing(&mut self, location: &Path) -> Result<u64> {
        self.ensure_empty("load an index")?;

        let (store, entries) = VectorStore::open_counted(location).await?;

        info!("Loaded index with {} chunks from {:?}", entries, location);
        self.stage = Stage::Ready(self.ready_index(
            store,
            IndexOrigin::Loaded,
            entries,
            location.to_path_buf(),
        ));
        Ok(entries)
    }

    /// Start a session: reuse the configured index when one exists on disk,
    /// otherwise ingest `pdf`. A directory is searched for its first PDF.
    ///
    /// Finding neither an index nor a PDF leaves the pipeline empty.
    #[inline]
    pub async fn open_or_ingest(&mut self, pdf: Option<&Path>) -> Result<PipelineState> {
        let location = self.config.index_path();
        if VectorStore::exists(&location) {
            self.load_existing(&location).await?;
            return Ok(self.state());
        }

        let pdf_path = match pdf {
            Some(path) if path.is_dir() => document::find_pdf(path)
                .map_err(|e| ChatPdfError::Ingestion(format!("{e:#}")))?,
            Some(path) => Some(path.to_path_buf()),
            None => None,
        };

        match pdf_path {
            Some(path) => {
                self.ingest(&path).await?;
            }
            None => info!("No stored index and no PDF to ingest"),
        }

        Ok(self.state())
    }

    /// Passages relevant to `question`; fails with
    /// [`ChatPdfError::IndexUnavailable`] while no index is live
    #[inline]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        match &self.stage {
            Stage::Ready(ready) => ready.retriever.retrieve(question).await,
            Stage::Empty | Stage::Building => Err(ChatPdfError::IndexUnavailable),
        }
    }

    /// Answer `question` from the loaded document.
    ///
    /// Returns [`NO_DOCUMENT_MESSAGE`] while empty. The model's answer is
    /// returned verbatim; generation failures are not retried.
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<String> {
        if !self.is_ready() {
            return Ok(NO_DOCUMENT_MESSAGE.to_string());
        }

        let chunks = self.retrieve(question).await?;
        debug!("Answering with {} retrieved passages", chunks.len());

        let prompt = self.assembler.assemble(question, &chunks);
        let generator = Arc::clone(&self.generator);

        tokio::task::spawn_blocking(move || generator.generate(&prompt))
            .await
            .map_err(|e| ChatPdfError::Generation(format!("Generation task failed: {e}")))?
            .map_err(|e| ChatPdfError::Generation(format!("{e:#}")))
    }

    /// Forget the live index. Persisted storage is left untouched.
    #[inline]
    pub fn clear(&mut self) {
        if !matches!(self.stage, Stage::Empty) {
            info!("Clearing pipeline state");
        }
        self.stage = Stage::Empty;
    }

    /// Remove the index persisted at `location`, clearing the pipeline first
    /// when that index is the live one. Returns whether anything was deleted.
    #[inline]
    pub async fn delete_storage(&mut self, location: &Path) -> Result<bool> {
        let is_live = matches!(&self.stage, Stage::Ready(ready) if ready.location == location);
        if is_live {
            self.clear();
        }

        VectorStore::delete(location).await
    }

    fn ensure_empty(&self, operation: &str) -> Result<()> {
        match self.stage {
            Stage::Empty => Ok(()),
            Stage::Building => Err(ChatPdfError::InvalidState(format!(
                "cannot {operation} while an index is being built"
            ))),
            Stage::Ready(_) => Err(ChatPdfError::InvalidState(format!(
                "cannot {operation} while a document is loaded; clear it first"
            ))),
        }
    }

    fn ready_index(
        &self,
        store: VectorStore,
        origin: IndexOrigin,
        entries: u64,
        location: PathBuf,
    ) -> ReadyIndex {
        let index: Arc<dyn VectorIndex> = Arc::new(store);
        ReadyIndex {
            origin,
            entries,
            location,
            retriever: Retriever::new(
                index,
                Arc::clone(&self.embedder),
                self.config.retrieval.clone(),
            ),
        }
    }
}
