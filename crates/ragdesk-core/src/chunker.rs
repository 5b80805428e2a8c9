//! Overlapping fixed-size word windows.

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::DocumentChunk;

pub const DEFAULT_CHUNK_SIZE: usize = 200;
pub const DEFAULT_OVERLAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than 0".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }
    pub fn overlap(&self) -> usize { self.overlap }
    pub fn stride(&self) -> usize { self.chunk_size - self.overlap }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_OVERLAP }
    }
}

/// Word windows as `(word_offset, words)`. Stops at the first window that
/// reaches the end of the sequence, so the last window is the only short one.
fn windows<'a>(words: &'a [&'a str], config: ChunkingConfig) -> Vec<(usize, &'a [&'a str])> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + config.chunk_size).min(words.len());
        out.push((start, &words[start..end]));
        if end >= words.len() { break; }
        start += config.stride();
    }
    out
}

/// Split `text` on whitespace into windows of up to `chunk_size` words that
/// overlap their predecessor by `overlap` words.
///
/// Returns an empty vector for text without words.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let config = ChunkingConfig::new(chunk_size, overlap)?;
    Ok(Chunker::new(config).split(text).into_iter().map(|(_, c)| c).collect())
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self { Self { config } }

    pub fn config(&self) -> ChunkingConfig { self.config }

    fn split(&self, text: &str) -> Vec<(usize, String)> {
        let words: Vec<&str> = text.split_whitespace().collect();
        windows(&words, self.config)
            .into_iter()
            .map(|(offset, w)| (offset, w.join(" ")))
            .filter(|(_, c)| !c.trim().is_empty())
            .collect()
    }

    /// Chunk one document's text, attaching provenance to every window.
    pub fn chunk_document(&self, text: &str, doc_id: &str, doc_path: &str) -> Vec<DocumentChunk> {
        let pieces = self.split(text);
        let total_chunks = pieces.len();
        debug!(doc_id, total_chunks, chunk_size = self.config.chunk_size, overlap = self.config.overlap, "chunked document");
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (word_offset, content))| DocumentChunk {
                doc_id: doc_id.to_string(),
                doc_path: doc_path.to_string(),
                chunk_index,
                total_chunks,
                word_offset,
                content,
            })
            .collect()
    }
}
