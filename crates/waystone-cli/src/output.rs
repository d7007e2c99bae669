//! Result formatting for terminal and JSON output.

use serde_json::json;
use waystone_core::FusedResult;

use crate::search::SearchOutcome;

/// Human-readable listing.
pub fn format_human(query: &str, outcome: &SearchOutcome) -> String {
    let mut out = String::new();

    if let Some(reason) = &outcome.semantic_error {
        out.push_str(&format!("(semantic search disabled: {reason})\n"));
    }

    if outcome.results.is_empty() {
        out.push_str("No results.");
        return out;
    }

    out.push_str(&format!("Results for {query:?}:\n"));
    for (i, result) in outcome.results.iter().enumerate() {
        out.push_str(&format!("{:2}. {}", i + 1, display_name(result)));
        if let Some(percent) = result.match_percent {
            out.push_str(&format!("  [{percent:.0}% match]"));
        }
        out.push('\n');
        out.push_str(&format!("    {}  (score {:.4})\n", result.slug, result.score));
    }
    out.trim_end().to_string()
}

/// Machine-readable listing.
pub fn format_json(query: &str, outcome: &SearchOutcome) -> String {
    let value = json!({
        "query": query,
        "semanticUsed": outcome.semantic_used,
        "semanticError": outcome.semantic_error,
        "results": outcome.results,
    });
    serde_json::to_string_pretty(&value).expect("results serialize")
}

fn display_name(result: &FusedResult) -> &str {
    match &result.title {
        Some(title) if !title.is_empty() => title,
        _ => &result.slug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(results: Vec<FusedResult>) -> SearchOutcome {
        SearchOutcome {
            results,
            semantic_used: true,
            semantic_error: None,
        }
    }

    #[test]
    fn test_empty_results_say_so() {
        let text = format_human("cat", &outcome(vec![]));
        assert!(text.contains("No results."));
    }

    #[test]
    fn test_human_output_includes_percent() {
        let text = format_human(
            "cat",
            &outcome(vec![FusedResult {
                slug: "notes/cats".to_string(),
                title: Some("Intro to Cats".to_string()),
                score: 1.53,
                match_percent: Some(82.4),
            }]),
        );
        assert!(text.contains("Intro to Cats"));
        assert!(text.contains("[82% match]"));
        assert!(text.contains("notes/cats"));
    }

    #[test]
    fn test_json_output_round_trips() {
        let text = format_json(
            "cat",
            &outcome(vec![FusedResult {
                slug: "notes/cats".to_string(),
                title: None,
                score: 0.5,
                match_percent: None,
            }]),
        );
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["query"], "cat");
        assert_eq!(value["results"][0]["slug"], "notes/cats");
    }
}
