//! Query scheduling and the interactive search session.
//!
//! The session owns what a search box owns: the monotonically increasing
//! sequence counter, the active retrieval mode, the debounce timer, and
//! the degrade-to-lexical switch. Every keystroke mints a new token;
//! every await point inside a running search re-checks that token and
//! silently bails when a newer keystroke superseded it, so no stale
//! result ever reaches the renderer.
//!
//! Debounce delay depends on how the term changed: extending a word can
//! wait for more letters, deleting should feel instant, and semantic mode
//! pays a small surcharge since its queries cost more.

use super::aggregation::aggregate_by_document;
use super::fusion::{fuse, rank_lexical_union, SearchMode};
use super::types::FusedResult;
use crate::config::{
    DEBOUNCE_DEFAULT_MS, DEBOUNCE_DEFAULT_SEMANTIC_SURCHARGE_MS, DEBOUNCE_EXTENSION_MS,
    DEBOUNCE_EXTENSION_SEMANTIC_SURCHARGE_MS, DEBOUNCE_REPLACEMENT_MS, DEBOUNCE_RETRACTION_MS,
    LEXICAL_FIELD_LIMIT, SEMANTIC_CHUNK_K,
};
use crate::index::ChunkRef;
use crate::lexical::{tokenize, LexicalIndex};
use crate::worker::SearchWorker;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Store key under which the UI persists the active mode.
pub const MODE_STORE_KEY: &str = "search:mode";

/// How a new term relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    /// The previous term is a proper prefix of the new one
    Extension,
    /// Neither term is a prefix of the other
    Replacement,
    /// The new term is a proper prefix of the previous one
    Retraction,
    /// Anything else (unchanged, or too short to classify)
    Other,
}

/// Classifies the edit between two consecutive terms.
pub fn classify_edit(prev: &str, next: &str) -> EditKind {
    if next.len() > prev.len() && next.starts_with(prev) {
        EditKind::Extension
    } else if next.len() < prev.len() && prev.starts_with(next) {
        EditKind::Retraction
    } else if !next.starts_with(prev) && !prev.starts_with(next) {
        EditKind::Replacement
    } else {
        EditKind::Other
    }
}

/// Debounce delay for an edit, given the new term length and whether
/// semantic mode is active.
pub fn debounce_delay(kind: EditKind, term_len: usize, semantic: bool) -> Duration {
    let ms = match kind {
        EditKind::Extension if term_len > 2 => {
            DEBOUNCE_EXTENSION_MS
                + if semantic {
                    DEBOUNCE_EXTENSION_SEMANTIC_SURCHARGE_MS
                } else {
                    0
                }
        }
        EditKind::Replacement if term_len > 3 => DEBOUNCE_REPLACEMENT_MS,
        EditKind::Retraction => DEBOUNCE_RETRACTION_MS,
        _ => {
            DEBOUNCE_DEFAULT_MS
                + if semantic {
                    DEBOUNCE_DEFAULT_SEMANTIC_SURCHARGE_MS
                } else {
                    0
                }
        }
    };
    Duration::from_millis(ms)
}

/// What the session tells the renderer.
#[derive(Debug, Clone)]
pub enum RenderEvent {
    /// A result set for `term`; `phase` distinguishes the interim lexical
    /// render from the final fused one
    Results {
        /// Sequence token that produced this render
        seq: u64,
        /// The query term as typed
        term: String,
        /// Which pass this is
        phase: RenderPhase,
        /// Ranked documents, possibly empty
        results: Vec<FusedResult>,
    },
    /// The semantic path died; the toggle should be disabled
    SemanticDisabled {
        /// Compact operator-facing reason
        message: String,
    },
}

/// Render passes within a single search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Lexical-only interim results
    Lexical,
    /// Lexical + semantic fused results
    Fused,
}

/// The interactive search session.
///
/// Clone-cheap handle; all state lives behind an `Arc`.
#[derive(Clone)]
pub struct SearchSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    lexical: LexicalIndex,
    worker: SearchWorker,
    chunk_metadata: Option<HashMap<String, ChunkRef>>,
    seq: AtomicU64,
    mode: Mutex<SearchMode>,
    semantic_enabled: AtomicBool,
    prev_term: Mutex<String>,
    pending: Mutex<Option<JoinHandle<()>>>,
    renders: mpsc::UnboundedSender<RenderEvent>,
}

impl SearchSession {
    /// Creates a session.
    ///
    /// `semantic_available` is false when worker init already failed; the
    /// session then never takes the semantic path.
    pub fn new(
        lexical: LexicalIndex,
        worker: SearchWorker,
        chunk_metadata: Option<HashMap<String, ChunkRef>>,
        mode: SearchMode,
        semantic_available: bool,
        renders: mpsc::UnboundedSender<RenderEvent>,
    ) -> Self {
        let mode = if semantic_available {
            mode
        } else {
            SearchMode::Lexical
        };
        Self {
            inner: Arc::new(SessionInner {
                lexical,
                worker,
                chunk_metadata,
                seq: AtomicU64::new(0),
                mode: Mutex::new(mode),
                semantic_enabled: AtomicBool::new(semantic_available),
                prev_term: Mutex::new(String::new()),
                pending: Mutex::new(None),
                renders,
            }),
        }
    }

    /// The active retrieval mode.
    pub fn mode(&self) -> SearchMode {
        *self.inner.mode.lock().expect("mode mutex poisoned")
    }

    /// Switches mode. Ignored when the semantic toggle is disabled.
    pub fn set_mode(&self, mode: SearchMode) {
        if mode == SearchMode::Semantic && !self.semantic_enabled() {
            return;
        }
        *self.inner.mode.lock().expect("mode mutex poisoned") = mode;
    }

    /// Whether the semantic path is still usable this session.
    pub fn semantic_enabled(&self) -> bool {
        self.inner.semantic_enabled.load(Ordering::Acquire)
    }

    /// The latest issued sequence token.
    pub fn current_seq(&self) -> u64 {
        self.inner.seq.load(Ordering::Acquire)
    }

    /// Handles a keystroke: cancels the pending timer, mints a token, and
    /// schedules the search after the edit-appropriate debounce.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_input(&self, term: &str) {
        let inner = self.inner.clone();
        let term = term.to_string();

        let kind = {
            let mut prev = inner.prev_term.lock().expect("term mutex poisoned");
            let kind = classify_edit(&prev, &term);
            *prev = term.clone();
            kind
        };

        let token = inner.seq.fetch_add(1, Ordering::AcqRel) + 1;
        let semantic = *inner.mode.lock().expect("mode mutex poisoned") == SearchMode::Semantic;
        let delay = debounce_delay(kind, term.len(), semantic);
        debug!(?kind, ?delay, token, "scheduling search");

        let task_inner = inner.clone();
        let mut pending = inner.pending.lock().expect("pending mutex poisoned");
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            SessionInner::run_search(task_inner, term, token).await;
        }));
    }

    /// Runs a search immediately with a fresh token, bypassing debounce.
    /// One-shot callers (the CLI) use this instead of [`on_input`].
    ///
    /// [`on_input`]: Self::on_input
    pub async fn search_now(&self, term: &str) {
        let token = self.inner.seq.fetch_add(1, Ordering::AcqRel) + 1;
        *self.inner.prev_term.lock().expect("term mutex poisoned") = term.to_string();
        SessionInner::run_search(self.inner.clone(), term.to_string(), token).await;
    }
}

impl SessionInner {
    fn is_stale(&self, token: u64) -> bool {
        self.seq.load(Ordering::Acquire) != token
    }

    fn render(&self, event: RenderEvent) {
        let _ = self.renders.send(event);
    }

    /// The search body. Checks the token at every await checkpoint; a
    /// superseded call returns without rendering.
    async fn run_search(inner: Arc<Self>, term: String, token: u64) {
        if inner.is_stale(token) {
            return;
        }

        let mode = *inner.mode.lock().expect("mode mutex poisoned");

        // Tag-filter queries carry the full-text portion after the tag;
        // the tag itself restricts both retrieval paths.
        let (tag_filter, text_portion) = match term.strip_prefix('#') {
            Some(rest) => {
                let (tag, text) = rest
                    .split_once(char::is_whitespace)
                    .unwrap_or((rest, ""));
                (Some(tag.to_string()), text.trim().to_string())
            }
            None => (None, term.clone()),
        };
        let query_tokens = tokenize(&text_portion);

        let field_hits = inner.lexical.query(&term, LEXICAL_FIELD_LIMIT);
        let candidates = rank_lexical_union(&inner.lexical, &field_hits, &query_tokens);

        if inner.is_stale(token) {
            return;
        }
        inner.render(RenderEvent::Results {
            seq: token,
            term: term.clone(),
            phase: RenderPhase::Lexical,
            results: fuse(&candidates, &[], mode),
        });

        if !inner.semantic_enabled.load(Ordering::Acquire) || query_tokens.is_empty() {
            return;
        }

        let response = inner
            .worker
            .search(&text_portion, SEMANTIC_CHUNK_K, token)
            .await;
        // Both checks matter: the response must echo our token and no
        // newer keystroke may have arrived while we were suspended.
        if response.seq != token || inner.is_stale(token) {
            return;
        }

        match response.result {
            Ok(hits) => {
                let mut semantic = aggregate_by_document(&hits, inner.chunk_metadata.as_ref());
                if let Some(tag) = &tag_filter {
                    // The tag restricts semantic hits just like lexical
                    // ones; an untagged document must not resurface
                    // through the vector path.
                    let allowed: std::collections::HashSet<String> = inner
                        .lexical
                        .docs_with_tag_prefix(tag)
                        .into_iter()
                        .map(|id| inner.lexical.slug(id).to_string())
                        .collect();
                    semantic.retain(|d| allowed.contains(&d.slug));
                }
                inner.render(RenderEvent::Results {
                    seq: token,
                    term,
                    phase: RenderPhase::Fused,
                    results: fuse(&candidates, &semantic, mode),
                });
            }
            Err(e) => {
                // One failed semantic query disables the path for the
                // rest of the session; lexical keeps working.
                warn!(error = %e, "semantic search failed, degrading to lexical");
                inner.semantic_enabled.store(false, Ordering::Release);
                *inner.mode.lock().expect("mode mutex poisoned") = SearchMode::Lexical;
                inner.render(RenderEvent::SemanticDisabled {
                    message: e.to_string(),
                });
            }
        }
    }
}
