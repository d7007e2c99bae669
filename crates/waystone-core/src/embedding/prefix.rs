//! Model-family query/passage prefixes.
//!
//! Asymmetric embedding models are trained with different prompts for
//! queries and passages; feeding both sides the same raw text collapses
//! retrieval quality. The rules live in one table so a new model family is
//! a single row, matched by substring on the model identifier.

/// Whether a text is embedded as a search query or an indexed passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    /// Query-side text (typed by the user)
    Query,
    /// Passage-side text (document chunks at build time)
    Passage,
}

/// A prefix rule: all `markers` must appear in the lowercased model id.
struct PrefixRule {
    markers: &'static [&'static str],
    query: &'static str,
    passage: &'static str,
}

/// First matching rule wins, so more specific marker sets come first.
const PREFIX_RULES: &[PrefixRule] = &[
    PrefixRule {
        markers: &["embeddinggemma"],
        query: "task: search result | query: ",
        passage: "title: none | text: ",
    },
    PrefixRule {
        markers: &["qwen", "embedding"],
        query: "Instruct: Given a web search query, retrieve relevant passages that answer the query\nQuery: ",
        passage: "",
    },
    PrefixRule {
        markers: &["e5"],
        query: "query: ",
        passage: "passage: ",
    },
];

/// Returns the prompt prefix for `model_id` and `kind`.
///
/// Unknown model families get no prefix on either side.
pub fn prefix_for(model_id: &str, kind: TextKind) -> &'static str {
    let id = model_id.to_lowercase();
    for rule in PREFIX_RULES {
        if rule.markers.iter().all(|m| id.contains(m)) {
            return match kind {
                TextKind::Query => rule.query,
                TextKind::Passage => rule.passage,
            };
        }
    }
    ""
}

/// Prepends the model-family prefix to `text`.
pub fn apply_prefix(model_id: &str, kind: TextKind, text: &str) -> String {
    let prefix = prefix_for(model_id, kind);
    if prefix.is_empty() {
        text.to_string()
    } else {
        format!("{prefix}{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_e5_prefixes() {
        assert_eq!(
            prefix_for("intfloat/multilingual-e5-large", TextKind::Query),
            "query: "
        );
        assert_eq!(
            prefix_for("intfloat/multilingual-e5-large", TextKind::Passage),
            "passage: "
        );
    }

    #[test]
    fn test_qwen_embedding_prefixes() {
        let id = "Qwen/Qwen3-Embedding-0.6B";
        assert!(prefix_for(id, TextKind::Query).starts_with("Instruct:"));
        assert_eq!(prefix_for(id, TextKind::Passage), "");
    }

    #[test]
    fn test_qwen_chat_model_gets_no_prefix() {
        // "qwen" alone is not enough; the family marker requires "embedding".
        assert_eq!(prefix_for("Qwen/Qwen2.5-7B-Instruct", TextKind::Query), "");
    }

    #[test]
    fn test_embeddinggemma_prefixes() {
        let id = "google/embeddinggemma-300m";
        assert_eq!(
            prefix_for(id, TextKind::Query),
            "task: search result | query: "
        );
        assert_eq!(
            prefix_for(id, TextKind::Passage),
            "title: none | text: "
        );
    }

    #[test]
    fn test_unknown_model_has_no_prefix() {
        assert_eq!(prefix_for("sentence-transformers/all-MiniLM-L6-v2", TextKind::Query), "");
        assert_eq!(
            apply_prefix("all-MiniLM-L6-v2", TextKind::Passage, "hello"),
            "hello"
        );
    }

    #[test]
    fn test_query_and_passage_forms_differ_for_known_families() {
        // The asymmetry the retrieval quality depends on: for every family
        // in the table, the query form of a text differs from the passage
        // form; for unknown models they are identical.
        for id in [
            "intfloat/e5-base-v2",
            "Qwen/Qwen3-Embedding-4B",
            "google/embeddinggemma-300m",
        ] {
            assert_ne!(
                apply_prefix(id, TextKind::Query, "hello"),
                apply_prefix(id, TextKind::Passage, "hello"),
                "expected asymmetric prompts for {id}"
            );
        }
        assert_eq!(
            apply_prefix("plain-model", TextKind::Query, "hello"),
            apply_prefix("plain-model", TextKind::Passage, "hello")
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(prefix_for("Intfloat/E5-Large-V2", TextKind::Query), "query: ");
    }
}
