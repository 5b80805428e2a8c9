//! Shared building blocks for the ragdesk retrieval workspace: domain types,
//! the error taxonomy, the `Embedder` seam, word-window chunking and
//! configuration.

pub mod chunker;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
