//! Layered configuration and path helpers.
//!
//! Figment merges `config.toml` + `config.<env>.toml` + `APP_*` env vars on top
//! of the built-in defaults. Nested keys in env vars are separated by `__`,
//! e.g. `APP_CHUNKING__CHUNK_SIZE=300`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::{ChunkingConfig, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::error::{Error, Result};

pub const DEFAULT_DIMENSION: usize = 384;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MAX_DOCUMENTS: usize = 5;
pub const DEFAULT_INDEX_PATH: &str = "faiss.index";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub ingest: IngestSettings,
    pub index: IndexSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub dimension: usize,
    /// Directory holding `tokenizer.json`, `config.json` and the weights.
    pub model_dir: Option<String>,
    /// Token limit per input; longer inputs are truncated.
    pub max_len: usize,
    pub batch_size: usize,
    /// `auto`, `cpu` or `metal`.
    pub device: String,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { dimension: DEFAULT_DIMENSION, model_dir: None, max_len: 256, batch_size: 32, device: "auto".to_string(), use_fake: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_OVERLAP }
    }
}

impl ChunkingSettings {
    pub fn config(&self) -> Result<ChunkingConfig> {
        ChunkingConfig::new(self.chunk_size, self.overlap)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k: DEFAULT_TOP_K } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub max_documents: usize,
}

impl Default for IngestSettings {
    fn default() -> Self { Self { max_documents: DEFAULT_MAX_DOCUMENTS } }
}

/// What opening an index should do when its backing file does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingIndexPolicy {
    #[default]
    #[serde(rename = "empty")]
    StartEmpty,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub path: String,
    pub on_missing: MissingIndexPolicy,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { path: DEFAULT_INDEX_PATH.to_string(), on_missing: MissingIndexPolicy::StartEmpty }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.embedding.dimension == 0 { return invalid("embedding.dimension must be greater than 0"); }
        if self.embedding.batch_size == 0 { return invalid("embedding.batch_size must be greater than 0"); }
        if self.embedding.max_len == 0 { return invalid("embedding.max_len must be greater than 0"); }
        if self.retrieval.top_k == 0 { return invalid("retrieval.top_k must be greater than 0"); }
        if self.ingest.max_documents == 0 { return invalid("ingest.max_documents must be greater than 0"); }
        if self.index.path.trim().is_empty() { return invalid("index.path must not be empty"); }
        self.chunking.config().map(|_| ())
    }

    /// Index file location, resolved against `base` when relative.
    pub fn index_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index.path)
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Extract and validate the typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
