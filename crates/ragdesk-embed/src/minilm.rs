use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use ragdesk_core::config::{expand_path, EmbeddingSettings};
use ragdesk_core::traits::Embedder;
use ragdesk_core::types::Embedding;
use ragdesk_core::{Error, Result};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Sentence encoder over a BERT checkpoint (all-MiniLM-L6-v2 by default):
/// masked mean pooling followed by L2 normalisation.
pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
    dim: usize,
    max_len: usize,
    batch_size: usize,
    id: String,
}

impl MiniLmEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let model_dir = resolve_model_dir(settings.model_dir.as_deref()).map_err(|e| Error::Embedding(format!("{e:#}")))?;
        Self::from_dir(&model_dir, settings)
    }

    pub fn from_dir(model_dir: &Path, settings: &EmbeddingSettings) -> Result<Self> {
        Self::load(model_dir, settings).map_err(|e| match e.downcast::<Error>() {
            Ok(err) => err,
            Err(e) => Error::Embedding(format!("failed to load model from {}: {e:#}", model_dir.display())),
        })
    }

    fn load(model_dir: &Path, settings: &EmbeddingSettings) -> anyhow::Result<Self> {
        let device = select_device(&settings.device)?;
        info!(model_dir = %model_dir.display(), "loading sentence encoder");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
        let json: serde_json::Value = serde_json::from_str(&raw)?;
        let hidden_size = json
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;
        if hidden_size != settings.dimension {
            return Err(Error::InvalidConfig(format!(
                "model produces {hidden_size}D embeddings but embedding.dimension is {}",
                settings.dimension
            ))
            .into());
        }
        let config: BertConfig = serde_json::from_value(json)?;

        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;

        let name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
        let id = format!("minilm:{name}:d{hidden_size}");
        info!(%id, "sentence encoder ready");
        Ok(Self { model, tokenizer, device, pad_id, dim: hidden_size, max_len: settings.max_len, batch_size: settings.batch_size, id })
    }

    fn embed_chunk(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>> {
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        Ok(rows)
    }
}

impl Embedder for MiniLmEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn model_id(&self) -> &str { &self.id }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            let rows = self.embed_chunk(batch).map_err(|e| Error::Embedding(format!("{e:#}")))?;
            out.extend(rows);
        }
        if out.len() != texts.len() {
            return Err(Error::Embedding(format!("model returned {} embeddings for {} inputs", out.len(), texts.len())));
        }
        let elapsed = start.elapsed();
        debug!(inputs = texts.len(), ?elapsed, "embedded batch");
        if elapsed.as_millis() > 100 * texts.len() as u128 {
            warn!(inputs = texts.len(), ?elapsed, "slow embedding");
        }
        Ok(out)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> anyhow::Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let tensors: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        let pickle = model_dir.join("pytorch_model.bin");
        candle_core::pickle::read_all(&pickle)
            .with_context(|| format!("reading {}", pickle.display()))?
            .into_iter()
            .collect()
    };
    Ok(VarBuilder::from_tensors(tensors, DTYPE, device))
}

/// Locate the model directory: configured path, then `APP_MODEL_DIR` /
/// `MODEL_DIR`, then `models/<name>` relative to the working directory or its parent.
pub fn resolve_model_dir(configured: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() { return Ok(p); }
        return Err(anyhow!("configured model_dir {} does not exist", p.display()));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = expand_path(&dir);
            if p.exists() { debug!(var, dir = %p.display(), "using model dir from env"); return Ok(p); }
        }
    }
    for candidate in [format!("models/{DEFAULT_MODEL_NAME}"), format!("../models/{DEFAULT_MODEL_NAME}")] {
        let p = PathBuf::from(&candidate);
        if p.exists() { return Ok(p); }
    }
    Err(anyhow!(
        "Could not locate {DEFAULT_MODEL_NAME} model directory. Checked embedding.model_dir, APP_MODEL_DIR, MODEL_DIR, models/ and ../models/"
    ))
}
