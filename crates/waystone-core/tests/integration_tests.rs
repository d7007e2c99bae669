//! End-to-end tests for the build → load → search pipeline.
//!
//! Each scenario builds a real index into a temp directory with the
//! deterministic hash embedder, loads it through the search worker, and
//! drives queries through the interactive session, asserting on what the
//! renderer receives.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;

use waystone_core::build::{build_index, BuildConfig};
use waystone_core::chunking::ChunkerConfig;
use waystone_core::config::SEMANTIC_CHUNK_K;
use waystone_core::hnsw::SearchParams;
use waystone_core::lexical::LexicalIndex;
use waystone_core::search::session::{RenderEvent, RenderPhase};
use waystone_core::search::SearchMode;
use waystone_core::storage::MemoryCache;
use waystone_core::test_utils::{doc, hash_driver, pets_corpus};
use waystone_core::{
    DocumentRecord, EmbedderConfig, InitRequest, SearchSession, SearchWorker, WorkerConfig,
};

const DIMS: usize = 64;

fn build_config(chunker: ChunkerConfig) -> BuildConfig {
    BuildConfig {
        chunker,
        dims: DIMS,
        shard_size_rows: 4,
        hnsw: Default::default(),
        public_prefix: "/embeddings".to_string(),
    }
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        embedder: EmbedderConfig::Hash,
        search_params: SearchParams::default(),
    }
}

fn init_request(manifest_url: String) -> InitRequest {
    InitRequest {
        config: worker_config(),
        manifest_url,
        base_url: None,
        disable_cache: false,
        cache: Some(Arc::new(MemoryCache::new())),
    }
}

/// Builds an index over `corpus`, spawns a worker over it, and wires up a
/// session. Returns the render event stream alongside.
async fn setup(
    corpus: &[DocumentRecord],
    chunker: ChunkerConfig,
    mode: SearchMode,
) -> (
    SearchSession,
    UnboundedReceiver<RenderEvent>,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().unwrap();
    build_index(corpus, &hash_driver(DIMS), &build_config(chunker), dir.path())
        .await
        .unwrap();

    let worker = SearchWorker::spawn();
    let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
    let manifest_url = dir.path().join("manifest.json").display().to_string();
    let manifest = worker
        .init(init_request(manifest_url), progress_tx)
        .await
        .expect("worker init");

    let (render_tx, render_rx) = mpsc::unbounded_channel();
    let session = SearchSession::new(
        LexicalIndex::build(corpus),
        worker,
        manifest.chunk_metadata.clone(),
        mode,
        true,
        render_tx,
    );
    (session, render_rx, dir)
}

fn unchunked() -> ChunkerConfig {
    ChunkerConfig {
        size: 2048,
        overlap: 512,
        disabled: true,
    }
}

/// Receives render events until the fused pass for `term` arrives.
async fn recv_fused(rx: &mut UnboundedReceiver<RenderEvent>, term: &str) -> RenderEvent {
    loop {
        let event = rx.recv().await.expect("render stream closed");
        if let RenderEvent::Results {
            phase: RenderPhase::Fused,
            term: t,
            ..
        } = &event
        {
            if t == term {
                return event;
            }
        }
    }
}

// E1: lexical-mode "cat" over the pets corpus.
#[tokio::test]
async fn test_lexical_query_ranks_title_matches_with_percentages() {
    let (session, mut renders, _dir) = setup(&pets_corpus(), unchunked(), SearchMode::Lexical).await;
    session.search_now("cat").await;

    // Interim lexical pass comes first and carries no percentages.
    let first = renders.recv().await.unwrap();
    match &first {
        RenderEvent::Results { phase, results, .. } => {
            assert_eq!(*phase, RenderPhase::Lexical);
            assert_eq!(results[0].slug, "notes/intro-to-cats");
            assert!(results.iter().all(|r| r.match_percent.is_none()));
        }
        other => panic!("expected interim results, got {other:?}"),
    }

    let fused = recv_fused(&mut renders, "cat").await;
    let RenderEvent::Results { results, .. } = fused else {
        unreachable!()
    };
    assert_eq!(results[0].slug, "notes/intro-to-cats");
    assert_eq!(results[1].slug, "notes/cat-grooming");
    // The semantic column shows a percentage for both cat documents.
    assert!(results[0].match_percent.is_some());
    assert!(results[1].match_percent.is_some());
}

// E2: tag query with no tagged documents renders an empty result set.
#[tokio::test]
async fn test_unknown_tag_renders_empty() {
    let (session, mut renders, _dir) = setup(&pets_corpus(), unchunked(), SearchMode::Lexical).await;
    session.search_now("#pets").await;

    let first = renders.recv().await.unwrap();
    let RenderEvent::Results { results, .. } = first else {
        panic!("expected results event");
    };
    assert!(results.is_empty(), "expected no results, got {results:?}");
}

// E3: tag filter restricts full-text matches to tagged documents.
#[tokio::test]
async fn test_tag_filter_restricts_to_tagged_documents() {
    let (session, mut renders, _dir) = setup(&pets_corpus(), unchunked(), SearchMode::Lexical).await;
    session.search_now("#animal cat").await;

    let fused = recv_fused(&mut renders, "#animal cat").await;
    let RenderEvent::Results { results, .. } = fused else {
        unreachable!()
    };
    // "cat" also matches notes/cat-grooming, but the tag filter confines
    // both retrieval paths to the tagged document.
    let slugs: Vec<&str> = results.iter().map(|r| r.slug.as_str()).collect();
    assert_eq!(slugs, vec!["notes/intro-to-cats"]);
}

// E4: chunk-level hits aggregate to the parent with the RRF series and
// the best chunk's score.
#[tokio::test]
async fn test_chunked_document_aggregation() {
    let mut body = "filler text about nothing in particular. ".repeat(40);
    body.push_str("the zephyr wind arrives. ");
    body.push_str(&"more filler prose follows here. ".repeat(40));
    body.push_str("zephyr returns once more at the end.");
    let corpus = vec![doc("notes/zephyr", "Zephyr Notes", &body, &[])];

    let chunker = ChunkerConfig {
        size: 512,
        overlap: 128,
        disabled: false,
    };
    let dir = tempfile::tempdir().unwrap();
    build_index(&corpus, &hash_driver(DIMS), &build_config(chunker), dir.path())
        .await
        .unwrap();

    let worker = SearchWorker::spawn();
    let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
    let manifest_url = dir.path().join("manifest.json").display().to_string();
    let manifest = worker
        .init(init_request(manifest_url), progress_tx)
        .await
        .unwrap();
    assert!(manifest.rows > 2, "expected a chunked document");

    let response = worker.search("zephyr wind", SEMANTIC_CHUNK_K, 1).await;
    assert_eq!(response.seq, 1);
    let hits = response.result.unwrap();
    assert!(!hits.is_empty());
    // All hits are chunks of the single document.
    assert!(hits.iter().all(|h| h.id.starts_with("notes/zephyr#chunk")));

    let aggregated = waystone_core::search::aggregate_by_document(
        &hits,
        manifest.chunk_metadata.as_ref(),
    );
    assert_eq!(aggregated.len(), 1);
    let doc_result = &aggregated[0];
    assert_eq!(doc_result.slug, "notes/zephyr");

    let expected_rrf: f32 = (0..hits.len()).map(|r| 1.0 / (60.0 + r as f32)).sum();
    assert!((doc_result.rrf - expected_rrf).abs() < 1e-6);

    let best = hits
        .iter()
        .map(|h| h.score)
        .fold(f32::MIN, f32::max);
    assert_eq!(doc_result.max_score, best);
}

// E5: failed worker init degrades the session to lexical-only exactly once.
#[tokio::test]
async fn test_failed_init_disables_semantic() {
    let worker = SearchWorker::spawn();
    let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
    let outcome = worker
        .init(
            init_request("/nonexistent/manifest.json".to_string()),
            progress_tx,
        )
        .await;
    assert!(outcome.is_err());

    let corpus = pets_corpus();
    let (render_tx, mut renders) = mpsc::unbounded_channel();
    let session = SearchSession::new(
        LexicalIndex::build(&corpus),
        worker,
        None,
        SearchMode::Semantic,
        false, // semantic unavailable after the failed init
        render_tx,
    );

    // Mode fell back to lexical and the toggle is dead.
    assert_eq!(session.mode(), SearchMode::Lexical);
    assert!(!session.semantic_enabled());
    session.set_mode(SearchMode::Semantic);
    assert_eq!(session.mode(), SearchMode::Lexical);

    // Lexical search still works, and only the interim pass renders.
    session.search_now("cat").await;
    let event = renders.recv().await.unwrap();
    let RenderEvent::Results { phase, results, .. } = event else {
        panic!("expected results");
    };
    assert_eq!(phase, RenderPhase::Lexical);
    assert!(!results.is_empty());
    assert!(renders.try_recv().is_err(), "no semantic pass expected");
}

// E6: rapid typing; only the final term's renders reach the UI.
#[tokio::test(start_paused = true)]
async fn test_rapid_typing_renders_only_final_seq() {
    let (session, mut renders, _dir) = setup(&pets_corpus(), unchunked(), SearchMode::Lexical).await;

    for term in ["c", "ca", "cat", "cats"] {
        session.on_input(term);
        tokio::time::advance(std::time::Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
    }
    // Let the last debounce fire.
    tokio::time::advance(std::time::Duration::from_millis(400)).await;

    let final_seq = session.current_seq();
    assert_eq!(final_seq, 4);

    // Collect every event up to and including the fused pass. Nothing
    // with a stale token or a superseded term may appear anywhere.
    let mut events = Vec::new();
    loop {
        let event = renders.recv().await.expect("render stream closed");
        let done = matches!(
            &event,
            RenderEvent::Results {
                phase: RenderPhase::Fused,
                ..
            }
        );
        events.push(event);
        if done {
            break;
        }
    }
    while let Ok(event) = renders.try_recv() {
        events.push(event);
    }

    for event in &events {
        if let RenderEvent::Results { seq, term, .. } = event {
            assert_eq!(*seq, final_seq, "stale seq reached the renderer");
            assert_eq!(term, "cats");
        }
    }
}

// Supersession: a second search issued while the first awaits the worker
// suppresses the first search's fused render.
#[tokio::test]
async fn test_newer_search_supersedes_older() {
    let (session, mut renders, _dir) = setup(&pets_corpus(), unchunked(), SearchMode::Lexical).await;

    // On the current-thread test runtime the spawned search runs up to
    // its first real suspension point (the worker call) at the yield,
    // then the main task mints a newer token before it can resume.
    let s1 = session.clone();
    let first = tokio::spawn(async move { s1.search_now("cat").await });
    tokio::task::yield_now().await;
    session.search_now("dog").await;
    first.await.unwrap();

    let fused = recv_fused(&mut renders, "dog").await;
    let RenderEvent::Results { results, .. } = fused else {
        unreachable!()
    };
    assert_eq!(results[0].slug, "notes/dog-training");

    // The superseded search rendered at most its interim pass; its fused
    // pass must never appear.
    let mut stale_fused = false;
    while let Ok(event) = renders.try_recv() {
        if let RenderEvent::Results {
            phase: RenderPhase::Fused,
            term,
            ..
        } = &event
        {
            if term == "cat" {
                stale_fused = true;
            }
        }
    }
    assert!(!stale_fused, "superseded search rendered its fused pass");
}

// Semantic mode: a body-only term surfaces the right document via the
// vector path even without any real language model.
#[tokio::test]
async fn test_semantic_mode_end_to_end() {
    let (session, mut renders, _dir) =
        setup(&pets_corpus(), unchunked(), SearchMode::Semantic).await;
    session.search_now("patience treats").await;

    let fused = recv_fused(&mut renders, "patience treats").await;
    let RenderEvent::Results { results, .. } = fused else {
        unreachable!()
    };
    assert_eq!(results[0].slug, "notes/dog-training");
    assert!(results[0].match_percent.is_some());
}

// Worker responses echo the originating sequence token.
#[tokio::test]
async fn test_worker_echoes_seq() {
    let dir = tempfile::tempdir().unwrap();
    build_index(
        &pets_corpus(),
        &hash_driver(DIMS),
        &build_config(unchunked()),
        dir.path(),
    )
    .await
    .unwrap();

    let worker = SearchWorker::spawn();
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let manifest_url = dir.path().join("manifest.json").display().to_string();
    worker
        .init(init_request(manifest_url), progress_tx)
        .await
        .unwrap();

    // Progress arrived for the single shard batch.
    let progress = progress_rx.recv().await.unwrap();
    assert_eq!(progress.total_rows, 3);

    for seq in [7u64, 42, 43] {
        let response = worker.search("cat", 5, seq).await;
        assert_eq!(response.seq, seq);
        let hits = response.result.unwrap();
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

// Reset drops worker state; searches fail until the next init.
#[tokio::test]
async fn test_reset_clears_worker() {
    let dir = tempfile::tempdir().unwrap();
    build_index(
        &pets_corpus(),
        &hash_driver(DIMS),
        &build_config(unchunked()),
        dir.path(),
    )
    .await
    .unwrap();

    let worker = SearchWorker::spawn();
    let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
    let manifest_url = dir.path().join("manifest.json").display().to_string();
    worker
        .init(init_request(manifest_url.clone()), progress_tx)
        .await
        .unwrap();

    assert!(worker.search("cat", 5, 1).await.result.is_ok());

    worker.reset();
    assert!(worker.search("cat", 5, 2).await.result.is_err());

    // Re-init restores service.
    let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
    worker
        .init(init_request(manifest_url), progress_tx)
        .await
        .unwrap();
    assert!(worker.search("cat", 5, 3).await.result.is_ok());
}
