//! Embedding backends for ragdesk.
//!
//! `MiniLmEmbedder` runs a BERT sentence encoder through candle;
//! `HashEmbedder` is a deterministic stand-in for tests and development.
//! `APP_USE_FAKE_EMBEDDINGS=1` forces the stand-in regardless of settings.

use std::sync::Arc;

use tracing::info;

use ragdesk_core::config::EmbeddingSettings;
use ragdesk_core::traits::Embedder;
use ragdesk_core::Result;

mod device;
mod hashing;
mod minilm;
mod pool;
mod tokenize;

pub use device::select_device;
pub use hashing::HashEmbedder;
pub use minilm::{resolve_model_dir, MiniLmEmbedder, DEFAULT_MODEL_NAME};
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

fn fake_requested_by_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the embedder described by `settings`.
pub fn load_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if settings.use_fake || fake_requested_by_env() {
        info!(dim = settings.dimension, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dimension)));
    }
    Ok(Arc::new(MiniLmEmbedder::new(settings)?))
}
