//! Flat L2 vector index with single-file persistence.

pub mod distance;
pub mod flat;
pub mod schema;

pub use flat::{FlatIndex, LoadOutcome};
