use std::path::{Path, PathBuf};

use ragdesk_core::{Error, Result};

use crate::extract::TEXT_EXTENSIONS;

/// Whether the extractor accepts files with this extension.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf") || TEXT_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
}

/// Supported documents under `root`, sorted by path. A file path is returned
/// as-is when supported.
pub fn discover_documents(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(Error::NotFound(root.display().to_string()));
    }
    if root.is_file() {
        return Ok(if is_supported(root) { vec![root.to_path_buf()] } else { vec![] });
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    Ok(files)
}
