//! Waystone query CLI.
//!
//! Searches a built index with the same hybrid pipeline the site runs in
//! the browser: lexical field matching fused with semantic chunk
//! retrieval.
//!
//! # Usage
//!
//! ```bash
//! waystone "graph layout"
//! waystone "#animal cat" --index public/embeddings
//! waystone "rust embeddings" -n 5 --mode semantic --json
//! ```

mod config;
mod output;
mod search;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use waystone_core::config as core_config;
use waystone_core::embedding::HASH_MODEL_ID;
use waystone_core::search::SearchMode;
use waystone_core::EmbedderConfig;

/// Hybrid search over a waystone index.
#[derive(Parser)]
#[command(name = "waystone", version, about)]
struct Cli {
    /// Search query (leading `#tag` filters by tag)
    query: Option<String>,

    /// Maximum number of results to return
    #[arg(short = 'n', long, default_value_t = core_config::RESULT_LIMIT)]
    limit: usize,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Retrieval mode (persisted across invocations)
    #[arg(long, value_parser = parse_mode)]
    mode: Option<SearchMode>,

    /// Index directory holding manifest.json and blobs
    #[arg(long, default_value = "public/embeddings")]
    index: PathBuf,

    /// Corpus JSONL file for the lexical index
    #[arg(long, default_value = "public/embeddings-text.jsonl")]
    jsonl: PathBuf,

    /// Embedding model id; must match the index build
    #[arg(long, default_value = HASH_MODEL_ID)]
    model: String,

    /// Local model directory (enables the candle backend)
    #[arg(long = "model-dir")]
    model_dir: Option<PathBuf>,

    /// OpenAI-compatible endpoint for query embedding
    #[arg(long = "vllm-url")]
    vllm_url: Option<String>,

    /// Skip the persistent asset cache
    #[arg(long = "no-cache")]
    no_cache: bool,

    /// Custom data directory (cache + persisted mode)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_mode(s: &str) -> Result<SearchMode, String> {
    match s {
        "lexical" => Ok(SearchMode::Lexical),
        "semantic" => Ok(SearchMode::Semantic),
        other => Err(format!("unknown mode {other:?} (lexical|semantic)")),
    }
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

    let Some(query) = &cli.query else {
        eprintln!("No search query provided. Use --help for usage information.");
        std::process::exit(1);
    };

    // An explicitly chosen mode becomes the new persisted default.
    let mode = match cli.mode {
        Some(mode) => {
            config::save_mode(cli.data_dir.as_ref(), mode);
            mode
        }
        None => config::load_mode(cli.data_dir.as_ref()),
    };

    let request = search::SearchRequest {
        query: query.clone(),
        index_dir: cli.index.clone(),
        jsonl: cli.jsonl.clone(),
        mode,
        embedder: embedder_config(&cli),
        no_cache: cli.no_cache,
        cache_path: config::cache_path(cli.data_dir.as_ref())?,
    };

    let mut outcome = search::execute_search(request).await?;
    outcome.results.truncate(cli.limit);

    let text = if cli.json {
        output::format_json(query, &outcome)
    } else {
        output::format_human(query, &outcome)
    };
    println!("{text}");
    Ok(())
}

fn embedder_config(cli: &Cli) -> EmbedderConfig {
    if let Some(url) = &cli.vllm_url {
        return EmbedderConfig::Remote {
            url: url.clone(),
            model: cli.model.clone(),
            batch_size: core_config::DEFAULT_EMBED_BATCH_SIZE,
            concurrency: 1,
        };
    }
    if let Some(dir) = &cli.model_dir {
        return EmbedderConfig::Local {
            model_dir: dir.clone(),
            model_id: cli.model.clone(),
        };
    }
    EmbedderConfig::Hash
}
