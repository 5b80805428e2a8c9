use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use ragdesk_core::config::MissingIndexPolicy;
use ragdesk_core::types::{DocumentChunk, Embedding, SearchHit};
use ragdesk_core::{Error, Result};

use crate::distance::squared_l2;
use crate::schema::{decode, encode, write_atomic, IndexImage};

/// Result of reading the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum LoadOutcome {
    Loaded { count: usize },
    NotFound,
}

/// Exact nearest-neighbour index over squared Euclidean distance.
///
/// Vectors are kept in one contiguous row-major buffer; row `i` belongs to
/// `chunks[i]`. Insertion is append-only and `add` either stores the whole
/// batch or nothing.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    path: PathBuf,
    vectors: Vec<f32>,
    chunks: Vec<DocumentChunk>,
    model_id: Option<String>,
}

impl FlatIndex {
    /// Empty index of `dim`-dimensional vectors backed by `path`. `dim` must be non-zero.
    pub fn new(dim: usize, path: impl Into<PathBuf>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("index dimension must be greater than 0".to_string()));
        }
        Ok(Self { dim, path: path.into(), vectors: Vec::new(), chunks: Vec::new(), model_id: None })
    }

    /// Record which embedder produced the vectors; checked against the file on load.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// New index at `path`, populated from disk when the file exists.
    pub fn open(dim: usize, path: impl Into<PathBuf>, model_id: Option<&str>, on_missing: MissingIndexPolicy) -> Result<Self> {
        let mut index = Self::new(dim, path)?;
        index.model_id = model_id.map(str::to_string);
        match index.load()? {
            LoadOutcome::Loaded { count } => info!(path = %index.path.display(), count, "loaded index"),
            LoadOutcome::NotFound => match on_missing {
                MissingIndexPolicy::StartEmpty => info!(path = %index.path.display(), "no index on disk, starting empty"),
                MissingIndexPolicy::Error => return Err(Error::NotFound(format!("index file {}", index.path.display()))),
            },
        }
        Ok(index)
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn path(&self) -> &Path { &self.path }
    pub fn len(&self) -> usize { self.chunks.len() }
    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }
    pub fn chunks(&self) -> &[DocumentChunk] { &self.chunks }
    pub fn model_id(&self) -> Option<&str> { self.model_id.as_deref() }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dim)?;
        self.vectors.get(start..start + self.dim)
    }

    /// Append `vectors` and their `chunks`, position for position.
    pub fn add(&mut self, vectors: &[Embedding], chunks: Vec<DocumentChunk>) -> Result<()> {
        if vectors.len() != chunks.len() {
            return Err(Error::LengthMismatch { vectors: vectors.len(), chunks: chunks.len() });
        }
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != self.dim {
                return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() });
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(Error::InvalidVector(format!("vector {i} contains NaN or infinite values")));
            }
        }
        self.vectors.reserve(vectors.len() * self.dim);
        for v in vectors {
            self.vectors.extend_from_slice(v);
        }
        self.chunks.extend(chunks);
        debug!(added = vectors.len(), total = self.len(), "appended vectors");
        Ok(())
    }

    /// Drop everything stored after the first `len` entries.
    ///
    /// Used to undo an `add` whose results could not be persisted.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len() { return; }
        self.vectors.truncate(len * self.dim);
        self.chunks.truncate(len);
        debug!(len, "truncated index");
    }

    /// Remove every vector and chunk, keeping dimension, path and model id.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Single-vector form of [`FlatIndex::add`].
    pub fn add_one(&mut self, vector: Embedding, chunk: DocumentChunk) -> Result<()> {
        self.add(std::slice::from_ref(&vector), vec![chunk])
    }

    /// The `top_k` closest chunks, nearest first, with their distances.
    ///
    /// Returns fewer than `top_k` hits when fewer vectors are stored.
    pub fn search_hits(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dim {
            return Err(Error::InvalidQuery { expected: self.dim, actual: query.len() });
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidVector("query contains NaN or infinite values".to_string()));
        }
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut heap = BinaryHeap::with_capacity(top_k + 1);
        for (position, row) in self.vectors.chunks_exact(self.dim).enumerate() {
            heap.push(Candidate { distance: squared_l2(query, row), position });
            if heap.len() > top_k {
                heap.pop();
            }
        }
        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| SearchHit { position: c.position, distance: c.distance, chunk: self.chunks[c.position].clone() })
            .collect())
    }

    /// Chunk text of the `top_k` nearest vectors, nearest first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<String>> {
        Ok(self.search_hits(query, top_k)?.into_iter().map(|h| h.chunk.content).collect())
    }

    /// Write vectors and chunk records to the backing file, replacing it atomically.
    pub fn save(&self) -> Result<()> {
        let image = IndexImage {
            dim: self.dim,
            vectors: self.vectors.clone(),
            chunks: self.chunks.clone(),
            model_id: self.model_id.clone(),
        };
        let bytes = encode(&image).map_err(|e| Error::persistence(&self.path, format!("{e:#}")))?;
        write_atomic(&self.path, &bytes).map_err(|e| Error::persistence(&self.path, e))?;
        info!(path = %self.path.display(), count = self.len(), bytes = bytes.len(), "saved index");
        Ok(())
    }

    /// Replace the in-memory contents with the backing file's.
    ///
    /// A missing file leaves the index untouched and reports `NotFound`.
    pub fn load(&mut self) -> Result<LoadOutcome> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadOutcome::NotFound),
            Err(e) => return Err(Error::persistence(&self.path, e)),
        };
        let image = decode(&bytes).map_err(|e| Error::persistence(&self.path, format!("{e:#}")))?;
        if image.dim != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: image.dim });
        }
        match (&self.model_id, &image.model_id) {
            (Some(ours), Some(theirs)) if ours != theirs => {
                warn!(path = %self.path.display(), expected = %ours, found = %theirs, "index was built with a different embedder");
            }
            (None, Some(theirs)) => self.model_id = Some(theirs.clone()),
            _ => {}
        }
        let count = image.chunks.len();
        self.vectors = image.vectors;
        self.chunks = image.chunks;
        Ok(LoadOutcome::Loaded { count })
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    position: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Candidate {
    // farther first out of the max-heap; ties keep the earlier position
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance).then(self.position.cmp(&other.position))
    }
}
