use crate::error::Result;
use crate::types::Embedding;

/// Maps text to fixed-dimension f32 vectors.
///
/// One instance is shared by ingestion and querying so that stored and query
/// vectors live in the same space. `embed_batch` returns exactly one vector per
/// input, in input order, for any batch size including zero.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// Stable identifier for the model and dimension, e.g. `minilm:all-MiniLM-L6-v2:d384`.
    fn model_id(&self) -> &str;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    fn embed_one(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| crate::Error::Embedding("model returned no embeddings".to_string()))
    }
}
