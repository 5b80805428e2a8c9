use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ragdesk_core::config::{Config, Settings};
use ragdesk_embed::load_embedder;
use ragdesk_pipeline::RagPipeline;
use ragdesk_text::discover_documents;

/// Local document retrieval: ingest files, then ask for context.
#[derive(Parser, Debug)]
#[command(name = "ragdesk", version, about = "Index documents and retrieve context for questions", long_about = None)]
pub struct Cli {
    /// Index file, overriding index.path from configuration
    #[arg(long, global = true, env = "RAGDESK_INDEX")]
    pub index: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, chunk, embed and index documents
    Ingest(IngestArgs),

    /// Print the context retrieved for a question
    Query(QueryArgs),

    /// Show what the index holds
    Status,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Files or directories; directories are searched for pdf, txt and md files
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Start a new index; the old file is replaced once a document is ingested
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    pub text: String,

    /// Number of chunks to retrieve (defaults to retrieval.top_k)
    #[arg(long, short = 'k')]
    pub top_k: Option<usize>,

    /// Print each chunk with its source and distance
    #[arg(long)]
    pub show_sources: bool,
}

pub fn execute(cli: Cli, config: &Config) -> Result<()> {
    let settings = config.settings()?;
    let fresh = matches!(&cli.command, Commands::Ingest(args) if args.fresh);
    let pipeline = open_pipeline(&settings, cli.index, fresh)?;
    match cli.command {
        Commands::Ingest(args) => ingest(&pipeline, args),
        Commands::Query(args) => query(&pipeline, args),
        Commands::Status => status(&pipeline),
    }
}

/// `fresh` skips reading the existing index file, so a missing or unreadable
/// index never blocks starting over.
fn open_pipeline(settings: &Settings, index: Option<PathBuf>, fresh: bool) -> Result<RagPipeline> {
    let embedder = load_embedder(&settings.embedding)?;
    let path = match index {
        Some(path) => path,
        None => settings.index_path(&std::env::current_dir().context("resolving working directory")?),
    };
    let pipeline = if fresh {
        RagPipeline::create_at(settings, embedder, &path)?
    } else {
        RagPipeline::open_at(settings, embedder, &path)?
    };
    Ok(pipeline)
}

fn ingest(pipeline: &RagPipeline, args: IngestArgs) -> Result<()> {
    let mut files = Vec::new();
    for path in &args.paths {
        let found = discover_documents(path).with_context(|| format!("reading {}", path.display()))?;
        if found.is_empty() {
            eprintln!("No supported documents in {}", path.display());
        }
        files.extend(found);
    }
    if files.is_empty() {
        bail!("nothing to ingest");
    }
    if files.len() > pipeline.max_documents() {
        bail!("{} documents found, at most {} can be ingested at once", files.len(), pipeline.max_documents());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    let report = pipeline.process_documents_with(&files, |path, chunks| {
        pb.set_message(format!("{} ({chunks} chunks)", path.display()));
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    // a fresh run replaces the old file only once some document went through
    if args.fresh && report.skipped.len() < files.len() {
        pipeline.save()?;
    }

    info!(chunks = report.chunks_added(), skipped = report.skipped.len(), "ingest complete");
    println!("Indexed {} chunks from {} documents", report.chunks_added(), files.len() - report.skipped.len());
    for skipped in &report.skipped {
        println!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    println!("Index now holds {} chunks", pipeline.len()?);
    Ok(())
}

fn query(pipeline: &RagPipeline, args: QueryArgs) -> Result<()> {
    let top_k = args.top_k.unwrap_or(pipeline.default_top_k());
    if pipeline.is_empty()? {
        eprintln!("Index is empty; ingest documents first");
    }
    if args.show_sources {
        for (rank, hit) in pipeline.retrieve(&args.text, top_k)?.iter().enumerate() {
            println!("#{} {} chunk {} (distance {:.4})", rank + 1, hit.doc_id, hit.chunk_index, hit.distance);
            println!("{}\n", hit.content);
        }
    } else {
        println!("{}", pipeline.query(&args.text, top_k)?);
    }
    Ok(())
}

fn status(pipeline: &RagPipeline) -> Result<()> {
    let index = pipeline.index();
    let index = index.read().map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
    println!("Index:      {}", index.path().display());
    println!("Exists:     {}", index.path().exists());
    println!("Dimension:  {}", index.dim());
    println!("Embedder:   {}", pipeline.embedder().model_id());
    println!("Chunks:     {}", index.len());
    drop(index);
    let documents = pipeline.documents()?;
    println!("Documents:  {}", documents.len());
    for doc in documents {
        println!("  - {doc}");
    }
    Ok(())
}
