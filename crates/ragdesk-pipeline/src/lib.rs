//! Ingestion and retrieval over a shared flat index.
//!
//! Ingestion runs extract → chunk → embed → add → save per document, in the
//! order the documents were given. Queries embed the question with the same
//! embedder and join the nearest chunks into one context string.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::{debug, info, warn};

use ragdesk_core::chunker::Chunker;
use ragdesk_core::config::Settings;
use ragdesk_core::traits::Embedder;
use ragdesk_core::types::{doc_id_for, Document, DocumentChunk};
use ragdesk_core::{Error, Result};
use ragdesk_text::TextExtractor;
use ragdesk_vector::FlatIndex;

/// Handle to the index shared between ingestion and queries.
pub type SharedIndex = Arc<RwLock<FlatIndex>>;

/// Separator between chunks in a context string.
pub const CONTEXT_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    /// Chunks added to the index, in document then window order.
    pub chunks: Vec<DocumentChunk>,
    pub skipped: Vec<SkippedDocument>,
}

impl IngestionReport {
    pub fn chunks_added(&self) -> usize { self.chunks.len() }
}

/// A retrieved chunk with its source and squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub distance: f32,
}

pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    extractor: TextExtractor,
    index: SharedIndex,
    max_documents: usize,
    default_top_k: usize,
}

impl RagPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, chunker: Chunker, index: SharedIndex, max_documents: usize, default_top_k: usize) -> Result<Self> {
        let dim = read_lock(&index)?.dim();
        if embedder.dim() != dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: embedder.dim() });
        }
        Ok(Self { embedder, chunker, extractor: TextExtractor::new(), index, max_documents, default_top_k })
    }

    /// Build a pipeline from settings, loading the index at the configured
    /// path (relative paths resolve against the working directory).
    pub fn open(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let base = std::env::current_dir().map_err(|e| Error::Operation(format!("working directory: {e}")))?;
        Self::open_at(settings, embedder, &settings.index_path(&base))
    }

    pub fn open_at(settings: &Settings, embedder: Arc<dyn Embedder>, index_path: &Path) -> Result<Self> {
        settings.validate()?;
        let index = FlatIndex::open(settings.embedding.dimension, index_path, Some(embedder.model_id()), settings.index.on_missing)?;
        Self::with_settings(settings, embedder, index)
    }

    /// Build a pipeline over a new, empty index at `index_path` without reading
    /// any existing file. The file is replaced on the first successful ingest.
    pub fn create_at(settings: &Settings, embedder: Arc<dyn Embedder>, index_path: &Path) -> Result<Self> {
        settings.validate()?;
        let index = FlatIndex::new(settings.embedding.dimension, index_path)?.with_model_id(embedder.model_id());
        info!(path = %index_path.display(), "starting a new index");
        Self::with_settings(settings, embedder, index)
    }

    fn with_settings(settings: &Settings, embedder: Arc<dyn Embedder>, index: FlatIndex) -> Result<Self> {
        Self::new(
            embedder,
            Chunker::new(settings.chunking.config()?),
            Arc::new(RwLock::new(index)),
            settings.ingest.max_documents,
            settings.retrieval.top_k,
        )
    }

    pub fn index(&self) -> SharedIndex { Arc::clone(&self.index) }
    pub fn embedder(&self) -> &dyn Embedder { self.embedder.as_ref() }
    pub fn max_documents(&self) -> usize { self.max_documents }
    pub fn default_top_k(&self) -> usize { self.default_top_k }

    /// Number of chunks currently indexed.
    pub fn len(&self) -> Result<usize> { Ok(read_lock(&self.index)?.len()) }

    pub fn is_empty(&self) -> Result<bool> { Ok(self.len()? == 0) }

    /// Distinct source documents in the index, in first-seen order.
    pub fn documents(&self) -> Result<Vec<String>> {
        let index = read_lock(&self.index)?;
        let mut ids: Vec<String> = Vec::new();
        for chunk in index.chunks() {
            if !ids.contains(&chunk.doc_id) {
                ids.push(chunk.doc_id.clone());
            }
        }
        Ok(ids)
    }

    pub fn process_documents<P: AsRef<Path>>(&self, paths: &[P]) -> Result<IngestionReport> {
        self.process_documents_with(paths, |_, _| {})
    }

    /// Ingest `paths` in order. `on_document` is called after each document
    /// with its path and the number of chunks it contributed.
    ///
    /// Unreadable documents, embedding failures and failed saves are recorded
    /// in `skipped`, and the index keeps none of that document's chunks.
    /// Dimension mismatches and lock failures abort the batch.
    pub fn process_documents_with<P, F>(&self, paths: &[P], mut on_document: F) -> Result<IngestionReport>
    where
        P: AsRef<Path>,
        F: FnMut(&Path, usize),
    {
        if paths.len() > self.max_documents {
            return Err(Error::TooManyDocuments { max: self.max_documents, given: paths.len() });
        }
        let start = Instant::now();
        let mut report = IngestionReport::default();
        for path in paths {
            let path = path.as_ref();
            match self.ingest_path(path) {
                Ok(chunks) => {
                    on_document(path, chunks.len());
                    report.chunks.extend(chunks);
                }
                Err(e) if e.is_document_scoped() => {
                    warn!(path = %path.display(), error = %e, "skipping document");
                    on_document(path, 0);
                    report.skipped.push(SkippedDocument { path: path.to_path_buf(), reason: e.to_string() });
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            documents = paths.len(),
            chunks = report.chunks.len(),
            skipped = report.skipped.len(),
            elapsed = ?start.elapsed(),
            "ingestion finished"
        );
        Ok(report)
    }

    pub fn ingest_path(&self, path: &Path) -> Result<Vec<DocumentChunk>> {
        let doc = Document::from_path(path)?;
        self.ingest_document(&doc)
    }

    /// Ingest one document and persist the index if it contributed chunks.
    ///
    /// When the save fails the document's chunks are removed again.
    pub fn ingest_document(&self, doc: &Document) -> Result<Vec<DocumentChunk>> {
        let text = self.extractor.extract(doc)?;
        let doc_path = doc.display_path().to_string_lossy().to_string();
        let doc_id = if doc.id.is_empty() { doc_id_for(Path::new(&doc_path)) } else { doc.id.clone() };
        let chunks = self.chunker.chunk_document(&text, &doc_id, &doc_path);
        if chunks.is_empty() {
            info!(%doc_id, "document has no text, nothing indexed");
            return Ok(chunks);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!("{} embeddings for {} chunks", vectors.len(), texts.len())));
        }

        let mut index = write_lock(&self.index)?;
        let before = index.len();
        index.add(&vectors, chunks.clone())?;
        if let Err(e) = index.save() {
            // memory must not hold chunks the file does not
            index.truncate(before);
            return Err(e);
        }
        info!(%doc_id, chunks = chunks.len(), total = index.len(), "indexed document");
        Ok(chunks)
    }

    /// Context string for `query`: the `top_k` nearest chunks joined by newlines.
    ///
    /// An empty index yields an empty string without embedding the query.
    pub fn query(&self, query: &str, top_k: usize) -> Result<String> {
        let chunks = self.retrieve(query, top_k)?;
        Ok(chunks.into_iter().map(|c| c.content).collect::<Vec<_>>().join(CONTEXT_SEPARATOR))
    }

    pub fn query_default(&self, query: &str) -> Result<String> {
        self.query(query, self.default_top_k)
    }

    /// Nearest chunks with provenance, closest first.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if self.is_empty()? {
            debug!("query against empty index");
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_one(query)?;
        let hits = read_lock(&self.index)?.search_hits(&vector, top_k)?;
        debug!(top_k, returned = hits.len(), "retrieved chunks");
        Ok(hits
            .into_iter()
            .map(|h| RetrievedChunk {
                content: h.chunk.content,
                doc_id: h.chunk.doc_id,
                chunk_index: h.chunk.chunk_index,
                distance: h.distance,
            })
            .collect())
    }

    /// Start a new session in memory: drop every indexed chunk. The file on
    /// disk is replaced on the next successful ingest, or by [`RagPipeline::save`].
    pub fn reset(&self) -> Result<()> {
        let mut index = write_lock(&self.index)?;
        index.clear();
        info!(path = %index.path().display(), "index reset");
        Ok(())
    }

    /// Persist the index as it is in memory.
    pub fn save(&self) -> Result<()> {
        read_lock(&self.index)?.save()
    }
}

fn read_lock(index: &SharedIndex) -> Result<RwLockReadGuard<'_, FlatIndex>> {
    index.read().map_err(|_| Error::Operation("index lock poisoned".to_string()))
}

fn write_lock(index: &SharedIndex) -> Result<RwLockWriteGuard<'_, FlatIndex>> {
    index.write().map_err(|_| Error::Operation("index lock poisoned".to_string()))
}
