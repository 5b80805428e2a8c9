use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ragdesk_core::config::{MissingIndexPolicy, Settings};
use ragdesk_core::traits::Embedder;
use ragdesk_core::types::{Document, Embedding};
use ragdesk_core::{Error, Result};
use ragdesk_embed::HashEmbedder;
use ragdesk_pipeline::RagPipeline;
use tempfile::TempDir;

const DIM: usize = 384;

/// Counts calls and can be told to fail, wrapping the hash embedder.
struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
    fail: bool,
}

impl CountingEmbedder {
    fn new(fail: bool) -> Self {
        Self { inner: HashEmbedder::new(DIM), calls: AtomicUsize::new(0), fail }
    }
}

impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn model_id(&self) -> &str { self.inner.model_id() }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Embedding("model not loaded".to_string()));
        }
        self.inner.embed_batch(texts)
    }
}

/// 450 words in three topical blocks of 150 so each window has a distinct flavour.
fn three_topic_text() -> String {
    let topics = ["granite basalt quartz", "violin cello sonata", "comet nebula orbit"];
    let mut words = Vec::new();
    for topic in topics {
        let vocab: Vec<&str> = topic.split(' ').collect();
        for i in 0..150 {
            words.push(vocab[i % vocab.len()].to_string());
        }
    }
    assert_eq!(words.len(), 450);
    words.join(" ")
}

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p
}

fn pipeline(index_path: &Path, embedder: Arc<dyn Embedder>) -> RagPipeline {
    RagPipeline::open_at(&Settings::default(), embedder, index_path).unwrap()
}

#[test]
fn ingest_450_words_then_query_top_two() {
    let tmp = TempDir::new().unwrap();
    let doc = write(tmp.path(), "rocks.txt", &three_topic_text());
    let rag = pipeline(&tmp.path().join("faiss.index"), Arc::new(HashEmbedder::new(DIM)));

    let report = rag.process_documents(&[&doc]).unwrap();
    assert_eq!(report.chunks_added(), 3);
    assert!(report.skipped.is_empty());
    let offsets: Vec<usize> = report.chunks.iter().map(|c| c.word_offset).collect();
    assert_eq!(offsets, vec![0, 150, 300]);
    assert!(report.chunks.iter().all(|c| c.doc_id == "rocks.txt" && c.total_chunks == 3));
    assert_eq!(rag.len().unwrap(), 3);

    let hits = rag.retrieve("comet nebula orbit", 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| !h.content.is_empty()));
    assert!(hits[0].distance <= hits[1].distance);
    assert_eq!(hits[0].chunk_index, 2);

    let context = rag.query("comet nebula orbit", 2).unwrap();
    assert_eq!(context.split('\n').count(), 2);
    assert!(context.starts_with(&hits[0].content));
}

#[test]
fn query_on_empty_index_is_empty_and_skips_embedding() {
    let tmp = TempDir::new().unwrap();
    let counter = Arc::new(CountingEmbedder::new(false));
    let rag = pipeline(&tmp.path().join("faiss.index"), counter.clone());

    assert_eq!(rag.query("anything at all", 5).unwrap(), "");
    assert!(rag.retrieve("anything", 5).unwrap().is_empty());
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn bad_documents_do_not_stop_the_batch() {
    let tmp = TempDir::new().unwrap();
    let good = write(tmp.path(), "good.txt", "granite basalt quartz sandstone");
    let corrupt = write(tmp.path(), "broken.pdf", "this is not a pdf");
    let missing = tmp.path().join("gone.pdf");
    let blank = write(tmp.path(), "blank.txt", "   \n\t ");
    let rag = pipeline(&tmp.path().join("faiss.index"), Arc::new(HashEmbedder::new(DIM)));

    let mut seen = Vec::new();
    let report = rag
        .process_documents_with(&[&corrupt, &good, &missing, &blank], |p, n| seen.push((p.to_path_buf(), n)))
        .unwrap();

    assert_eq!(report.chunks_added(), 1);
    assert_eq!(report.chunks[0].doc_id, "good.txt");
    let skipped: Vec<&Path> = report.skipped.iter().map(|s| s.path.as_path()).collect();
    assert_eq!(skipped, vec![corrupt.as_path(), missing.as_path()]);
    assert_eq!(seen, vec![(corrupt.clone(), 0), (good.clone(), 1), (missing.clone(), 0), (blank.clone(), 0)]);
    assert_eq!(rag.documents().unwrap(), vec!["good.txt".to_string()]);
}

#[test]
fn embedding_failure_skips_document_and_leaves_index_empty() {
    let tmp = TempDir::new().unwrap();
    let doc = write(tmp.path(), "a.txt", "some words here");
    let index_path = tmp.path().join("faiss.index");
    let rag = pipeline(&index_path, Arc::new(CountingEmbedder::new(true)));

    let report = rag.process_documents(&[&doc]).unwrap();
    assert!(report.chunks.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].reason.contains("model not loaded"));
    assert!(rag.is_empty().unwrap());
    assert!(!index_path.exists());
}

#[test]
fn more_than_max_documents_is_rejected_up_front() {
    let tmp = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..6).map(|i| write(tmp.path(), &format!("d{i}.txt"), "word")).collect();
    let rag = pipeline(&tmp.path().join("faiss.index"), Arc::new(HashEmbedder::new(DIM)));

    let err = rag.process_documents(&paths).unwrap_err();
    assert!(matches!(err, Error::TooManyDocuments { max: 5, given: 6 }));
    assert!(rag.is_empty().unwrap());

    let report = rag.process_documents(&paths[..5]).unwrap();
    assert_eq!(report.chunks_added(), 5);
}

#[test]
fn reopened_pipeline_answers_the_same() {
    let tmp = TempDir::new().unwrap();
    let index_path = tmp.path().join("store/faiss.index");
    let doc = write(tmp.path(), "rocks.txt", &three_topic_text());
    let notes = write(tmp.path(), "notes.md", "violin practice schedule and cello strings");

    let first = pipeline(&index_path, Arc::new(HashEmbedder::new(DIM)));
    first.process_documents(&[&doc, &notes]).unwrap();
    let before = first.retrieve("violin cello", 3).unwrap();

    let mut settings = Settings::default();
    settings.index.on_missing = MissingIndexPolicy::Error;
    let second = RagPipeline::open_at(&settings, Arc::new(HashEmbedder::new(DIM)), &index_path).unwrap();
    assert_eq!(second.len().unwrap(), 4);
    assert_eq!(second.documents().unwrap(), vec!["rocks.txt".to_string(), "notes.md".to_string()]);
    assert_eq!(second.retrieve("violin cello", 3).unwrap(), before);
}

#[test]
fn missing_index_with_error_policy_fails_to_open() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.index.on_missing = MissingIndexPolicy::Error;
    let result = RagPipeline::open_at(&settings, Arc::new(HashEmbedder::new(DIM)), &tmp.path().join("none.index"));
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn embedder_dimension_must_match_index() {
    let tmp = TempDir::new().unwrap();
    let result = RagPipeline::open_at(&Settings::default(), Arc::new(HashEmbedder::new(128)), &tmp.path().join("x.index"));
    assert!(matches!(result, Err(Error::DimensionMismatch { expected: 384, actual: 128 })));
}

#[test]
fn in_memory_upload_and_reset() {
    let tmp = TempDir::new().unwrap();
    let index_path = tmp.path().join("faiss.index");
    let rag = pipeline(&index_path, Arc::new(HashEmbedder::new(DIM)));

    let upload = Document::from_bytes("upload.txt", b"comet tail dust ice".to_vec());
    let chunks = rag.ingest_document(&upload).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(rag.query_default("comet").unwrap(), "comet tail dust ice");

    rag.reset().unwrap();
    assert!(rag.is_empty().unwrap());
    assert_eq!(rag.query("comet", 5).unwrap(), "");
    // reset alone leaves the file untouched
    assert_eq!(pipeline(&index_path, Arc::new(HashEmbedder::new(DIM))).len().unwrap(), 1);

    rag.ingest_document(&Document::from_bytes("next.txt", b"violin cello".to_vec())).unwrap();
    let reopened = pipeline(&index_path, Arc::new(HashEmbedder::new(DIM)));
    assert_eq!(reopened.documents().unwrap(), vec!["next.txt".to_string()]);

    rag.reset().unwrap();
    rag.save().unwrap();
    assert!(pipeline(&index_path, Arc::new(HashEmbedder::new(DIM))).is_empty().unwrap());
}

#[test]
fn failed_save_skips_document_and_rolls_back() {
    let tmp = TempDir::new().unwrap();
    let index_path = tmp.path().join("faiss.index");
    let a = write(tmp.path(), "a.txt", "alpha beta gamma");
    let b = write(tmp.path(), "b.txt", "delta epsilon");
    let rag = pipeline(&index_path, Arc::new(HashEmbedder::new(DIM)));

    // a directory where the index file should go makes every save fail
    fs::create_dir_all(&index_path).unwrap();
    let report = rag.process_documents(&[&a, &b]).unwrap();

    assert!(report.chunks.is_empty());
    let skipped: Vec<&Path> = report.skipped.iter().map(|s| s.path.as_path()).collect();
    assert_eq!(skipped, vec![a.as_path(), b.as_path()]);
    assert!(rag.is_empty().unwrap());
    assert_eq!(rag.query("alpha", 5).unwrap(), "");

    fs::remove_dir(&index_path).unwrap();
    let report = rag.process_documents(&[&b]).unwrap();
    assert_eq!(report.chunks_added(), 1);
    assert_eq!(rag.documents().unwrap(), vec!["b.txt".to_string()]);
}

#[test]
fn failed_save_keeps_earlier_documents() {
    let tmp = TempDir::new().unwrap();
    let index_path = tmp.path().join("faiss.index");
    let rag = pipeline(&index_path, Arc::new(HashEmbedder::new(DIM)));
    rag.ingest_document(&Document::from_bytes("first.txt", b"comet nebula".to_vec())).unwrap();

    fs::remove_file(&index_path).unwrap();
    fs::create_dir_all(&index_path).unwrap();
    let err = rag.ingest_document(&Document::from_bytes("second.txt", b"granite basalt".to_vec())).unwrap_err();
    assert!(matches!(err, Error::Persistence { .. }));
    assert_eq!(rag.documents().unwrap(), vec!["first.txt".to_string()]);
}

#[test]
fn create_ignores_existing_or_missing_file() {
    let tmp = TempDir::new().unwrap();
    let index_path = tmp.path().join("faiss.index");
    fs::write(&index_path, b"not an index").unwrap();
    let mut settings = Settings::default();
    settings.index.on_missing = MissingIndexPolicy::Error;

    assert!(matches!(
        RagPipeline::open_at(&settings, Arc::new(HashEmbedder::new(DIM)), &index_path),
        Err(Error::Persistence { .. })
    ));
    let rag = RagPipeline::create_at(&settings, Arc::new(HashEmbedder::new(DIM)), &index_path).unwrap();
    assert!(rag.is_empty().unwrap());
    rag.ingest_document(&Document::from_bytes("a.txt", b"alpha".to_vec())).unwrap();
    let reopened = RagPipeline::open_at(&settings, Arc::new(HashEmbedder::new(DIM)), &index_path).unwrap();
    assert_eq!(reopened.len().unwrap(), 1);

    let missing = tmp.path().join("new/faiss.index");
    assert!(RagPipeline::create_at(&settings, Arc::new(HashEmbedder::new(DIM)), &missing).unwrap().is_empty().unwrap());
}

#[test]
fn index_handle_is_shared() {
    let tmp = TempDir::new().unwrap();
    let rag = pipeline(&tmp.path().join("faiss.index"), Arc::new(HashEmbedder::new(DIM)));
    let handle = rag.index();
    rag.ingest_document(&Document::from_bytes("a.txt", b"alpha beta".to_vec())).unwrap();
    assert_eq!(handle.read().unwrap().len(), 1);
}
