use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use ragdesk_core::traits::Embedder;
use ragdesk_core::types::Embedding;
use ragdesk_core::{Error, Result};

/// Deterministic bag-of-words vectors from xxHash buckets, L2-normalised.
///
/// Texts sharing words land close together, which is enough for tests and
/// offline development without model weights.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hash:xxh64:d{dim}") }
    }

    fn embed_text(&self, text: &str) -> Embedding {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn model_id(&self) -> &str { &self.id }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if self.dim == 0 {
            return Err(Error::Embedding("hash embedder configured with dimension 0".to_string()));
        }
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
