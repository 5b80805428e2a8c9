//! Domain types shared by the extractor, chunker, index and pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub type Embedding = Vec<f32>;

/// Raw content of an uploaded source file.
///
/// `id` is the stable identifier (original filename or path). A document is
/// only held long enough to extract its text.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub path: Option<PathBuf>,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn from_bytes(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { id: id.into(), path: None, bytes }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::extraction(path, e))?;
        Ok(Self { id: doc_id_for(path), path: Some(path.to_path_buf()), bytes })
    }

    /// Path used in error messages and chunk provenance.
    pub fn display_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from(&self.id))
    }
}

/// Document identity derived from a path: the file name, or the whole path
/// when there is none.
pub fn doc_id_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// A window of words from one document, the unit that gets embedded and indexed.
///
/// - `doc_id`/`doc_path`: where the chunk came from
/// - `chunk_index`/`total_chunks`: position within the parent document
/// - `word_offset`: index of the first word of the window in the document's word sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub doc_id: String,
    pub doc_path: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub word_offset: usize,
    pub content: String,
}

/// A nearest-neighbour match: stored position, squared L2 distance, and the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
    pub chunk: DocumentChunk,
}
