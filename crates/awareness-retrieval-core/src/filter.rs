//! Metadata filtering for search queries.
//!
//! A [`MetadataFilter`] is a conjunction of `key = value` conditions
//! evaluated against a record's stored metadata blob. A condition matches
//! when the metadata value at `key` is:
//! - a string equal to `value`,
//! - a number or boolean whose string form equals `value`,
//! - an array containing such an element (containment, used for `tags`).
//!
//! Missing keys never match.

use std::fmt;

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;

/// A single equality/containment condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCondition {
    pub field: String,
    pub value: String,
}

/// Conjunction of metadata conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataFilter {
    pub must: Vec<FilterCondition>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality (or, for arrays, containment) condition.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.push(FilterCondition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Parse `key=value[,key=value...]`.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut filter = Self::new();
        for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((field, value)) = part.split_once('=') else {
                bail!("invalid filter '{}': expected key=value", part);
            };
            let field = field.trim();
            if field.is_empty() {
                bail!("invalid filter '{}': empty key", part);
            }
            filter = filter.with_field(field, value.trim());
        }
        if filter.is_empty() {
            bail!("empty filter expression");
        }
        Ok(filter)
    }

    /// Check a parsed metadata object against every condition.
    pub fn matches(&self, metadata: &Value) -> bool {
        self.must.iter().all(|cond| match metadata.get(&cond.field) {
            Some(v) => value_matches(v, &cond.value),
            None => false,
        })
    }

    /// Check a serialized metadata blob. Unparseable blobs never match.
    pub fn matches_json(&self, blob: &str) -> bool {
        match serde_json::from_str::<Value>(blob) {
            Ok(v) => self.matches(&v),
            Err(_) => false,
        }
    }
}

impl fmt::Display for MetadataFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .must
            .iter()
            .map(|c| format!("{}={}", c.field, c.value))
            .collect();
        f.write_str(&parts.join(","))
    }
}

fn value_matches(field_value: &Value, expected: &str) -> bool {
    match field_value {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        Value::Array(items) => items
            .iter()
            .any(|item| !item.is_array() && value_matches(item, expected)),
        Value::Null | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eq_string() {
        let f = MetadataFilter::new().with_field("type", "example");
        assert!(f.matches(&json!({"type": "example", "source": "x"})));
        assert!(!f.matches(&json!({"type": "template"})));
    }

    #[test]
    fn test_missing_key_never_matches() {
        let f = MetadataFilter::new().with_field("category", "phishing");
        assert!(!f.matches(&json!({"type": "threat"})));
    }

    #[test]
    fn test_tags_containment() {
        let f = MetadataFilter::new().with_field("tags", "vishing");
        assert!(f.matches(&json!({"tags": ["phishing", "vishing"]})));
        assert!(!f.matches(&json!({"tags": ["phishing"]})));
    }

    #[test]
    fn test_conjunction() {
        let f = MetadataFilter::new().with_field("type", "threat").with_field("category", "phishing");
        assert!(f.matches(&json!({"type": "threat", "category": "phishing"})));
        assert!(!f.matches(&json!({"type": "threat", "category": "malware"})));
    }

    #[test]
    fn test_number_and_bool_compare_as_strings() {
        assert!(MetadataFilter::new().with_field("year", "2023").matches(&json!({"year": 2023})));
        assert!(MetadataFilter::new().with_field("draft", "false").matches(&json!({"draft": false})));
    }

    #[test]
    fn test_null_and_object_do_not_match() {
        let f = MetadataFilter::new().with_field("author", "x");
        assert!(!f.matches(&json!({"author": null})));
        assert!(!f.matches(&json!({"author": {"name": "x"}})));
    }

    #[test]
    fn test_matches_json_invalid_blob() {
        assert!(!MetadataFilter::new().with_field("type", "x").matches_json("{broken"));
    }

    #[test]
    fn test_parse() {
        let f = MetadataFilter::parse("type=example, category = phishing").unwrap();
        assert_eq!(f.must.len(), 2);
        assert_eq!(f.must[1].field, "category");
        assert_eq!(f.must[1].value, "phishing");
        assert_eq!(f.to_string(), "type=example,category=phishing");
    }

    #[test]
    fn test_parse_value_may_contain_equals() {
        let f = MetadataFilter::parse("title=a=b").unwrap();
        assert_eq!(f.must[0].value, "a=b");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(MetadataFilter::parse("type").is_err());
        assert!(MetadataFilter::parse("=x").is_err());
        assert!(MetadataFilter::parse(" , ").is_err());
    }
}
