//! On-disk layout of a persisted index. All integers little-endian.
//!
//! ```text
//! magic      4 bytes  "RDXI"
//! version    u32
//! dim        u32
//! count      u64
//! vectors    count * dim * f32
//! meta_len   u64
//! meta       meta_len bytes of JSON: { model_id, chunks: [DocumentChunk; count] }
//! digest     32 bytes blake3 of everything above
//! ```

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use ragdesk_core::types::DocumentChunk;

pub const MAGIC: [u8; 4] = *b"RDXI";
pub const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;
const DIGEST_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct StoredMeta {
    model_id: Option<String>,
    chunks: Vec<DocumentChunk>,
}

/// Contents of an index file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexImage {
    pub dim: usize,
    pub vectors: Vec<f32>,
    pub chunks: Vec<DocumentChunk>,
    pub model_id: Option<String>,
}

pub fn encode(image: &IndexImage) -> Result<Vec<u8>> {
    let count = image.chunks.len();
    ensure!(
        image.vectors.len() == count * image.dim,
        "{} floats do not form {count} vectors of {}D",
        image.vectors.len(),
        image.dim
    );
    let dim = u32::try_from(image.dim).with_context(|| format!("dimension {} too large", image.dim))?;
    let meta = serde_json::to_vec(&StoredMeta { model_id: image.model_id.clone(), chunks: image.chunks.clone() })
        .context("serializing chunk records")?;

    let mut out = Vec::with_capacity(HEADER_LEN + image.vectors.len() * 4 + 8 + meta.len() + DIGEST_LEN);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&dim.to_le_bytes());
    out.extend_from_slice(&(count as u64).to_le_bytes());
    for x in &image.vectors {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out.extend_from_slice(&(meta.len() as u64).to_le_bytes());
    out.extend_from_slice(&meta);
    let digest = blake3::hash(&out);
    out.extend_from_slice(digest.as_bytes());
    Ok(out)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let Some(end) = self.pos.checked_add(n).filter(|end| *end <= self.bytes.len()) else {
            bail!("truncated file while reading {what}");
        };
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let b = self.take(8, what)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }
}

pub fn decode(bytes: &[u8]) -> Result<IndexImage> {
    ensure!(bytes.len() >= HEADER_LEN + DIGEST_LEN, "file too short ({} bytes)", bytes.len());
    let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
    ensure!(blake3::hash(body).as_bytes() == digest, "checksum mismatch");

    let mut r = Reader { bytes: body, pos: 0 };
    ensure!(r.take(4, "magic")? == MAGIC.as_slice(), "not an index file (bad magic)");
    let version = r.u32("version")?;
    ensure!(version == FORMAT_VERSION, "unsupported format version {version}");
    let dim = r.u32("dimension")? as usize;
    let count = usize::try_from(r.u64("count")?).context("vector count overflows usize")?;
    let Some(float_bytes) = count.checked_mul(dim).and_then(|n| n.checked_mul(4)) else {
        bail!("vector block size overflows");
    };
    let vectors = r
        .take(float_bytes, "vectors")?
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let meta_len = usize::try_from(r.u64("meta length")?).context("meta length overflows usize")?;
    let meta: StoredMeta = serde_json::from_slice(r.take(meta_len, "chunk records")?).context("parsing chunk records")?;
    ensure!(r.pos == body.len(), "{} trailing bytes after chunk records", body.len() - r.pos);
    ensure!(meta.chunks.len() == count, "{} chunk records for {count} vectors", meta.chunks.len());
    Ok(IndexImage { dim, vectors, chunks: meta.chunks, model_id: meta.model_id })
}

/// Write `bytes` to a sibling temp file and rename it over `path`, so readers
/// see either the old file or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
