//! Similarity scoring and hit shaping.
//!
//! The backend returns raw nearest-neighbour candidates ordered by ascending
//! Euclidean distance. This module turns them into caller-facing
//! [`SearchHit`]s without changing their order:
//!
//! 1. `similarity = 1 / (1 + max(distance, 0))`, in `(0, 1]`.
//! 2. Content is taken from the record's dedicated content field when it is
//!    non-empty, else from the `content` key of the metadata blob.
//! 3. Metadata is parsed into [`DocumentMetadata`] with collection defaults.

use serde::Serialize;
use serde_json::Value;

use crate::models::DocumentMetadata;
use crate::store::QueryCandidate;

/// Result count used when the caller does not pass one.
pub const DEFAULT_LIMIT: usize = 5;

/// A single ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    /// `None` when the backend could not compute a distance for the record.
    pub similarity: Option<f64>,
}

/// Map a distance to a similarity score. Negative distances clamp to 0.
pub fn similarity_from_distance(distance: Option<f32>) -> Option<f64> {
    let d = f64::from(distance?);
    if d.is_nan() {
        return None;
    }
    Some(1.0 / (1.0 + d.max(0.0)))
}

/// Resolve the text of a stored record.
///
/// Records written by this crate carry their text in `content`. Older loaders
/// stored it under a `content` key inside the metadata blob, either as a
/// string or as an object with its own `content` string.
pub fn resolve_content(content: Option<&str>, metadata_json: &str) -> String {
    if let Some(text) = content.filter(|t| !t.is_empty()) {
        return text.to_string();
    }

    let Ok(meta) = serde_json::from_str::<Value>(metadata_json) else {
        return String::new();
    };
    match meta.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(obj @ Value::Object(map)) => match map.get("content") {
            Some(Value::String(s)) => s.clone(),
            _ => obj.to_string(),
        },
        _ => String::new(),
    }
}

/// Shape backend candidates into hits, preserving their order.
pub fn hits_from_candidates(candidates: Vec<QueryCandidate>) -> Vec<SearchHit> {
    candidates
        .into_iter()
        .map(|c| SearchHit {
            content: resolve_content(c.content.as_deref(), &c.metadata_json),
            metadata: DocumentMetadata::from_stored(&c.metadata_json),
            similarity: similarity_from_distance(c.distance),
            id: c.id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_zero_distance_is_one() {
        assert_eq!(similarity_from_distance(Some(0.0)), Some(1.0));
    }

    #[test]
    fn test_similarity_known_values() {
        assert_eq!(similarity_from_distance(Some(1.0)), Some(0.5));
        assert_eq!(similarity_from_distance(Some(3.0)), Some(0.25));
    }

    #[test]
    fn test_similarity_negative_clamps() {
        assert_eq!(similarity_from_distance(Some(-0.2)), Some(1.0));
    }

    #[test]
    fn test_similarity_none_passes_through() {
        assert_eq!(similarity_from_distance(None), None);
        assert_eq!(similarity_from_distance(Some(f32::NAN)), None);
    }

    #[test]
    fn test_similarity_is_monotonic() {
        let distances = [0.0f32, 0.1, 0.5, 1.0, 2.0, 10.0, 1000.0];
        let scores: Vec<f64> = distances
            .iter()
            .map(|d| similarity_from_distance(Some(*d)).unwrap())
            .collect();
        for pair in scores.windows(2) {
            assert!(pair[0] > pair[1]);
        }
        assert!(scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_content_prefers_dedicated_field() {
        let text = resolve_content(Some("body"), r#"{"content":"other"}"#);
        assert_eq!(text, "body");
    }

    #[test]
    fn test_content_falls_back_to_metadata_string() {
        assert_eq!(resolve_content(None, r#"{"content":"legacy"}"#), "legacy");
        assert_eq!(resolve_content(Some(""), r#"{"content":"legacy"}"#), "legacy");
    }

    #[test]
    fn test_content_from_nested_object() {
        let blob = r#"{"content":{"content":"nested","lang":"de"}}"#;
        assert_eq!(resolve_content(None, blob), "nested");
    }

    #[test]
    fn test_content_object_without_inner_text_is_serialized() {
        let blob = r#"{"content":{"lang":"de"}}"#;
        assert_eq!(resolve_content(None, blob), r#"{"lang":"de"}"#);
    }

    #[test]
    fn test_content_missing_everywhere_is_empty() {
        assert_eq!(resolve_content(None, r#"{"source":"x"}"#), "");
        assert_eq!(resolve_content(None, "garbage"), "");
    }

    #[test]
    fn test_hits_keep_order_and_defaults() {
        let candidates = vec![
            QueryCandidate {
                id: "b".into(),
                content: Some("second".into()),
                metadata_json: r#"{"source":"BSI","type":"threat","date_added":"2024-01-01"}"#
                    .into(),
                distance: Some(0.0),
            },
            QueryCandidate {
                id: "a".into(),
                content: None,
                metadata_json: "{}".into(),
                distance: None,
            },
        ];
        let hits = hits_from_candidates(candidates);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[0].similarity, Some(1.0));
        assert_eq!(hits[0].metadata.source, "BSI");
        assert_eq!(hits[1].id, "a");
        assert_eq!(hits[1].similarity, None);
        assert_eq!(hits[1].metadata.source, "unknown");
        assert_eq!(hits[1].metadata.doc_type, "document");
        assert_eq!(hits[1].content, "");
    }
}
