//! Waystone index builder.
//!
//! Reads a JSONL corpus (one document per line: slug, title, text, tags,
//! aliases), chunks and embeds it, and writes the vector shards, HNSW
//! graph blob, and manifest the query engine serves from.
//!
//! # Usage
//!
//! ```bash
//! # Remote (vLLM or any OpenAI-compatible endpoint)
//! waystone-build --jsonl public/embeddings-text.jsonl \
//!     --model intfloat/multilingual-e5-large --dims 1024 \
//!     --use-vllm --vllm-url http://127.0.0.1:8000/v1 --out public/embeddings
//!
//! # Local candle model directory
//! waystone-build --jsonl corpus.jsonl --model intfloat/e5-small-v2 \
//!     --model-dir models/e5-small-v2 --dims 384 --out out
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use waystone_core::build::{build_index, load_jsonl, BuildConfig};
use waystone_core::chunking::ChunkerConfig;
use waystone_core::config;
use waystone_core::embedding::{
    EmbedBackend, EmbedDriver, HashEmbedder, LocalEmbedder, RemoteEmbedder, HASH_MODEL_ID,
};
use waystone_core::hnsw::HnswParams;

fn default_vllm_url() -> String {
    std::env::var("VLLM_URL")
        .or_else(|_| std::env::var("VLLM_EMBED_URL"))
        .unwrap_or_else(|_| "http://127.0.0.1:8000/v1".to_string())
}

/// Build the search index for a documentation site.
#[derive(Parser)]
#[command(name = "waystone-build", version, about)]
struct Cli {
    /// Corpus JSONL file (one document per line)
    #[arg(long, default_value = "public/embeddings-text.jsonl")]
    jsonl: PathBuf,

    /// Embedding model identifier ("hash" selects the model-free backend)
    #[arg(long, default_value = "intfloat/multilingual-e5-large")]
    model: String,

    /// Output directory for shards, graph, and manifest
    #[arg(long, default_value = "public/embeddings")]
    out: PathBuf,

    /// Vector element type (only fp32 is supported)
    #[arg(long, default_value = "fp32")]
    dtype: String,

    /// Embedding dimension written to the index
    #[arg(long, default_value_t = 1024)]
    dims: usize,

    /// Rows per vector shard
    #[arg(long = "shard-size", default_value_t = config::DEFAULT_SHARD_SIZE_ROWS)]
    shard_size: usize,

    /// Chunk window in characters
    #[arg(long = "chunk-size", default_value_t = config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Overlap between adjacent chunks in characters
    #[arg(long = "chunk-overlap", default_value_t = config::DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Disable chunking (embed full documents)
    #[arg(long = "no-chunking")]
    no_chunking: bool,

    /// Embed through an OpenAI-compatible endpoint instead of locally
    /// (also enabled by a non-empty USE_VLLM environment variable)
    #[arg(long = "use-vllm")]
    use_vllm: bool,

    /// Endpoint base URL (accepts /v1 or /v1/embeddings forms)
    #[arg(long = "vllm-url", default_value_t = default_vllm_url())]
    vllm_url: String,

    /// Concurrent requests to the endpoint
    #[arg(long, env = "VLLM_CONCURRENCY", default_value_t = config::DEFAULT_EMBED_CONCURRENCY)]
    concurrency: usize,

    /// Texts per embedding request
    #[arg(long = "batch-size", env = "VLLM_BATCH_SIZE", default_value_t = config::DEFAULT_EMBED_BATCH_SIZE)]
    batch_size: usize,

    /// Local model directory (model.safetensors, config.json, tokenizer.json)
    #[arg(long = "model-dir")]
    model_dir: Option<PathBuf>,

    /// URL path prefix recorded in the manifest
    #[arg(long = "public-prefix", default_value = "/embeddings")]
    public_prefix: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if cli.dtype != "fp32" {
        bail!("unsupported dtype {:?} (only fp32 is supported)", cli.dtype);
    }
    if cli.dims == 0 {
        bail!("--dims must be positive");
    }

    let docs = load_jsonl(&cli.jsonl)
        .with_context(|| format!("failed to load corpus {}", cli.jsonl.display()))?;
    if docs.is_empty() {
        println!(
            "No input found in {}; run the site build first to emit JSONL.",
            cli.jsonl.display()
        );
        return Ok(());
    }
    info!(documents = docs.len(), "loaded corpus");

    let backend = build_backend(&cli).await?;
    let driver = EmbedDriver::new(backend, cli.dims);

    let config = BuildConfig {
        chunker: ChunkerConfig {
            size: cli.chunk_size,
            overlap: cli.chunk_overlap,
            disabled: cli.no_chunking,
        },
        dims: cli.dims,
        shard_size_rows: cli.shard_size,
        hnsw: HnswParams::default(),
        public_prefix: cli.public_prefix.clone(),
    };

    let stats = build_index(&docs, &driver, &config, &cli.out)
        .await
        .context("index build failed")?;

    println!(
        "Wrote index for {} documents ({} rows, {} chunked) to {}",
        stats.documents,
        stats.rows,
        stats.chunked_documents,
        cli.out.display()
    );
    Ok(())
}

/// Picks the embedding backend from the CLI surface.
async fn build_backend(cli: &Cli) -> Result<Box<dyn EmbedBackend>> {
    let use_vllm = cli.use_vllm
        || std::env::var("USE_VLLM")
            .map(|v| !v.is_empty())
            .unwrap_or(false);
    if use_vllm {
        let mut remote = RemoteEmbedder::new(&cli.vllm_url, &cli.model, cli.batch_size, cli.concurrency)
            .context("invalid remote embedding configuration")?;
        remote
            .preflight()
            .await
            .context("embedding endpoint preflight failed")?;
        return Ok(Box::new(remote));
    }

    if cli.model == HASH_MODEL_ID {
        return Ok(Box::new(HashEmbedder::new(cli.dims)));
    }

    let model_dir = cli.model_dir.as_ref().with_context(|| {
        format!(
            "local embedding needs --model-dir with weights for {} (or pass --use-vllm)",
            cli.model
        )
    })?;
    let local = LocalEmbedder::from_dir(model_dir, &cli.model)
        .with_context(|| format!("failed to load local model from {}", model_dir.display()))?;
    Ok(Box::new(local))
}
