use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use tracing::debug;

use ragdesk_core::types::Document;
use ragdesk_core::{Error, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";
pub(crate) const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    /// PDF when the bytes carry the PDF header or the name ends in `.pdf`;
    /// plain text for `.txt`/`.md`/`.markdown`; `None` for anything else.
    pub fn detect(doc: &Document) -> Option<Self> {
        let ext = Path::new(&doc.id).extension().and_then(|s| s.to_str());
        let has_ext = |wanted: &str| ext.is_some_and(|e| e.eq_ignore_ascii_case(wanted));
        if doc.bytes.starts_with(PDF_MAGIC) || has_ext("pdf") {
            Some(Self::Pdf)
        } else if TEXT_EXTENSIONS.iter().any(|t| has_ext(t)) {
            Some(Self::PlainText)
        } else {
            None
        }
    }
}

/// Converts a document into a single string, pages concatenated in order.
///
/// A failure on any page fails the whole document.
#[derive(Debug, Clone, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self { Self }

    pub fn extract_path(&self, path: &Path) -> Result<String> {
        let doc = Document::from_path(path)?;
        self.extract(&doc)
    }

    pub fn extract(&self, doc: &Document) -> Result<String> {
        let kind = DocumentKind::detect(doc)
            .ok_or_else(|| Error::extraction(doc.display_path(), "unsupported format, expected pdf, txt or md"))?;
        let text = match kind {
            DocumentKind::Pdf => join_pages(extract_pdf_pages(doc)?),
            DocumentKind::PlainText => decode_text(doc)?,
        };
        debug!(doc_id = %doc.id, ?kind, chars = text.len(), "extracted text");
        Ok(text)
    }
}

fn extract_pdf_pages(doc: &Document) -> Result<Vec<String>> {
    if !doc.bytes.starts_with(PDF_MAGIC) {
        return Err(Error::extraction(doc.display_path(), "missing %PDF- header"));
    }
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let outcome = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem_by_pages(&doc.bytes)));
    match outcome {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(Error::extraction(doc.display_path(), e)),
        Err(_) => Err(Error::extraction(doc.display_path(), "PDF parser panicked")),
    }
}

/// Page texts in page order, with no separator beyond what each page yields.
pub fn join_pages(pages: Vec<String>) -> String {
    pages.concat()
}

fn decode_text(doc: &Document) -> Result<String> {
    std::str::from_utf8(&doc.bytes)
        .map(str::to_string)
        .map_err(|e| Error::extraction(doc.display_path(), format!("not valid UTF-8 text: {e}")))
}
