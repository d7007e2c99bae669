//! Lexical retrieval: a multi-field forward-token index.
//!
//! Documents are tokenized into four fields (title, content, tags,
//! aliases); queries match by token prefix, so results refine with every
//! keystroke. A leading `#` switches to tag-filter semantics: `#tag term`
//! restricts the corpus to documents carrying a matching tag and
//! full-text-searches `term` inside that subset, while a bare `#tag`
//! lists documents by tag prefix.

pub mod tokenizer;

pub use tokenizer::{normalize_term, tokenize};

use crate::search::types::DocumentRecord;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// The searchable fields, in union-rank order: a title hit outranks a
/// content hit for the same cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Document title
    Title,
    /// Full body text
    Content,
    /// Tag set
    Tags,
    /// Alternative titles
    Aliases,
}

/// All fields in evaluation order.
pub const FIELDS: [Field; 4] = [Field::Title, Field::Content, Field::Tags, Field::Aliases];

/// Candidate ids from one field, in index order.
#[derive(Debug, Clone)]
pub struct FieldHits {
    /// Which field produced these candidates
    pub field: Field,
    /// Document ids, ascending
    pub ids: Vec<u32>,
}

/// Forward-token index over a document corpus.
///
/// Read-only after construction; the worker and session share it freely.
pub struct LexicalIndex {
    slugs: Vec<String>,
    titles: Vec<String>,
    title_tokens: Vec<HashSet<String>>,
    doc_tags: Vec<Vec<String>>,
    /// Per field: token -> ascending posting list of doc ids
    postings: [BTreeMap<String, Vec<u32>>; 4],
}

impl LexicalIndex {
    /// Builds the index over `docs`. Document ids are positions in the
    /// input slice.
    pub fn build(docs: &[DocumentRecord]) -> Self {
        let mut postings: [BTreeMap<String, Vec<u32>>; 4] = Default::default();
        let mut slugs = Vec::with_capacity(docs.len());
        let mut titles = Vec::with_capacity(docs.len());
        let mut title_tokens = Vec::with_capacity(docs.len());
        let mut doc_tags = Vec::with_capacity(docs.len());

        for (id, doc) in docs.iter().enumerate() {
            let id = id as u32;
            slugs.push(doc.slug.clone());
            titles.push(doc.title.clone());

            let t_tokens = tokenize(&doc.title);
            index_tokens(&mut postings[0], &t_tokens, id);
            title_tokens.push(t_tokens.into_iter().collect());

            index_tokens(&mut postings[1], &tokenize(&doc.text), id);

            let tags: Vec<String> = doc.tags.iter().map(|t| normalize_term(t)).collect();
            for tag in &tags {
                if !tag.is_empty() {
                    push_posting(&mut postings[2], tag.clone(), id);
                }
            }
            doc_tags.push(tags);

            for alias in &doc.aliases {
                index_tokens(&mut postings[3], &tokenize(alias), id);
            }
        }

        debug!(docs = docs.len(), "built lexical index");

        Self {
            slugs,
            titles,
            title_tokens,
            doc_tags,
            postings,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }

    /// Slug of document `id`.
    pub fn slug(&self, id: u32) -> &str {
        &self.slugs[id as usize]
    }

    /// Title of document `id`.
    pub fn title(&self, id: u32) -> &str {
        &self.titles[id as usize]
    }

    /// Whether any query token is a prefix of a title token of `id`.
    ///
    /// Drives the title boost during fusion.
    pub fn title_matches(&self, id: u32, query_tokens: &[String]) -> bool {
        let tokens = &self.title_tokens[id as usize];
        query_tokens
            .iter()
            .any(|q| tokens.iter().any(|t| t.starts_with(q.as_str())))
    }

    /// Documents carrying a tag that starts with `prefix` (normalized).
    ///
    /// Used by the session to confine the semantic path to the same tag
    /// filter the lexical path applies.
    pub fn docs_with_tag_prefix(&self, prefix: &str) -> Vec<u32> {
        let prefix = normalize_term(prefix);
        if prefix.is_empty() {
            return Vec::new();
        }
        (0..self.slugs.len() as u32)
            .filter(|&id| {
                self.doc_tags[id as usize]
                    .iter()
                    .any(|t| t.starts_with(&prefix))
            })
            .collect()
    }

    /// Evaluates `raw` and returns one candidate list per matching field.
    ///
    /// Returns at most `limit` ids per field. Malformed or empty queries
    /// yield an empty result set rather than an error.
    pub fn query(&self, raw: &str, limit: usize) -> Vec<FieldHits> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Vec::new();
        }

        if let Some(rest) = raw.strip_prefix('#') {
            return self.query_tagged(rest, limit);
        }

        let tokens = tokenize(raw);
        if tokens.is_empty() {
            return Vec::new();
        }
        self.query_fields(&tokens, None, limit)
    }

    /// `#tag` / `#tag term` evaluation.
    fn query_tagged(&self, rest: &str, limit: usize) -> Vec<FieldHits> {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let tag_prefix = normalize_term(parts.next().unwrap_or(""));
        let term = parts.next().unwrap_or("").trim();

        if tag_prefix.is_empty() {
            return Vec::new();
        }

        let tagged = self.docs_with_tag_prefix(&tag_prefix);

        if term.is_empty() {
            let mut ids = tagged;
            ids.truncate(limit);
            return vec![FieldHits {
                field: Field::Tags,
                ids,
            }];
        }

        let tokens = tokenize(term);
        if tokens.is_empty() {
            return Vec::new();
        }
        let allowed: HashSet<u32> = tagged.into_iter().collect();
        self.query_fields(&tokens, Some(&allowed), limit)
    }

    fn query_fields(
        &self,
        tokens: &[String],
        allowed: Option<&HashSet<u32>>,
        limit: usize,
    ) -> Vec<FieldHits> {
        let mut out = Vec::new();
        for (fi, field) in FIELDS.into_iter().enumerate() {
            let mut matched: Option<HashSet<u32>> = None;
            for token in tokens {
                let token_docs = self.prefix_postings(&self.postings[fi], token);
                matched = Some(match matched {
                    None => token_docs,
                    Some(prev) => prev.intersection(&token_docs).copied().collect(),
                });
                if matched.as_ref().is_some_and(|m| m.is_empty()) {
                    break;
                }
            }

            let Some(matched) = matched else { continue };
            let mut ids: Vec<u32> = matched
                .into_iter()
                .filter(|id| allowed.map_or(true, |a| a.contains(id)))
                .collect();
            if ids.is_empty() {
                continue;
            }
            ids.sort_unstable();
            ids.truncate(limit);
            out.push(FieldHits { field, ids });
        }
        out
    }

    /// Union of posting lists for all tokens starting with `prefix`.
    fn prefix_postings(&self, field: &BTreeMap<String, Vec<u32>>, prefix: &str) -> HashSet<u32> {
        field
            .range(prefix.to_string()..)
            .take_while(|(token, _)| token.starts_with(prefix))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}

fn index_tokens(field: &mut BTreeMap<String, Vec<u32>>, tokens: &[String], id: u32) {
    let unique: HashSet<&String> = tokens.iter().collect();
    for token in unique {
        push_posting(field, token.clone(), id);
    }
}

fn push_posting(field: &mut BTreeMap<String, Vec<u32>>, token: String, id: u32) {
    let list = field.entry(token).or_default();
    if list.last() != Some(&id) {
        list.push(id);
    }
}
