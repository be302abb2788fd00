//! Decode-with-fallback for structured model output.
//!
//! Model output that should be JSON is decoded into a `Decoded<T>` so callers
//! (and tests) can tell whether the value came from the model or from the
//! documented fallback.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Outcome of decoding structured model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Decoded<T> {
    /// The model output decoded successfully.
    Parsed { value: T },
    /// Decoding failed; `value` is the fallback.
    Fallback { value: T, reason: String },
}

impl<T> Decoded<T> {
    pub fn parsed(value: T) -> Self {
        Decoded::Parsed { value }
    }

    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Decoded::Fallback {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Decoded::Fallback { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Decoded::Parsed { value } | Decoded::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Decoded::Parsed { value } | Decoded::Fallback { value, .. } => value,
        }
    }
}

/// Strip a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Decode JSON from model output, tolerating code fences and leading prose.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let body = strip_code_fence(text);
    match serde_json::from_str::<T>(body) {
        Ok(v) => Ok(v),
        Err(first_err) => {
            // Retry on the outermost JSON-looking span ("Here you go: [...]")
            let start = body.find(['[', '{']);
            let end = body.rfind([']', '}']);
            match (start, end) {
                (Some(s), Some(e)) if e > s => {
                    serde_json::from_str::<T>(&body[s..=e]).map_err(|e| e.to_string())
                }
                _ => Err(first_err.to_string()),
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryListShape {
    List(Vec<String>),
    Object { queries: Vec<String> },
}

/// Decode a list of search queries.
///
/// Accepts a JSON array of strings or an object with a `queries` array.
/// Queries are trimmed, emptied entries dropped, each cut to `max_chars`
/// characters, and the list capped at `max_queries`. Anything else (including
/// an empty list) yields `fallback`.
pub fn decode_query_list(
    text: &str,
    max_queries: usize,
    max_chars: usize,
    fallback: Vec<String>,
) -> Decoded<Vec<String>> {
    let raw = match decode_json::<QueryListShape>(text) {
        Ok(QueryListShape::List(list)) => list,
        Ok(QueryListShape::Object { queries }) => queries,
        Err(reason) => return Decoded::fallback(fallback, reason),
    };

    let queries: Vec<String> = raw
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .map(|q| crate::search::truncate_chars(q, max_chars).trim_end().to_string())
        .take(max_queries)
        .collect();

    if queries.is_empty() {
        Decoded::fallback(fallback, "model returned an empty query list")
    } else {
        Decoded::parsed(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fb() -> Vec<String> {
        vec!["fallback query".to_string()]
    }

    #[test]
    fn test_decode_plain_array() {
        let d = decode_query_list(r#"["a", "b", "c"]"#, 2, 300, fb());
        assert_eq!(d, Decoded::parsed(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_decode_object_with_queries() {
        let d = decode_query_list(r#"{"queries": ["x", "  ", "y"]}"#, 5, 300, fb());
        assert!(!d.is_fallback());
        assert_eq!(d.value(), &vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_decode_fenced_with_prose() {
        let text = "Sure! Here are the queries:\n```json\n[\"one\", \"two\"]\n```";
        let d = decode_query_list(text, 5, 300, fb());
        assert_eq!(d.into_value(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_decode_garbage_falls_back() {
        let d = decode_query_list("I could not think of any queries.", 3, 300, fb());
        assert!(d.is_fallback());
        assert_eq!(d.value(), &fb());
    }

    #[test]
    fn test_decode_empty_list_falls_back() {
        let d = decode_query_list("[]", 3, 300, fb());
        assert!(d.is_fallback());
    }

    #[test]
    fn test_queries_truncated() {
        let long = "q".repeat(500);
        let d = decode_query_list(&format!("[\"{long}\"]"), 3, 300, fb());
        assert_eq!(d.value()[0].chars().count(), 300);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  [1] "), "[1]");
    }
}
