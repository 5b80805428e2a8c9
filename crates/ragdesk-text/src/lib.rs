//! ragdesk-text
//!
//! Turns uploaded documents into one linear text stream per document and
//! finds candidate documents on disk.

pub mod discover;
pub mod extract;

pub use discover::{discover_documents, is_supported};
pub use extract::{DocumentKind, TextExtractor};
