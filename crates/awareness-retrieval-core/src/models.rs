//! Collection and document models.
//!
//! The store holds exactly three collections ([`CollectionName`]). Every
//! record carries a [`DocumentMetadata`] with three always-populated fields
//! and four optional pass-through fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RetrievalError;

/// One of the three fixed partitions of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionName {
    Papers,
    Templates,
    Threats,
}

impl CollectionName {
    pub const ALL: [CollectionName; 3] = [
        CollectionName::Papers,
        CollectionName::Templates,
        CollectionName::Threats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Papers => "papers",
            CollectionName::Templates => "templates",
            CollectionName::Threats => "threats",
        }
    }

    /// Human-readable description stored alongside the collection.
    pub fn description(&self) -> &'static str {
        match self {
            CollectionName::Papers => "Research papers and excerpts on security awareness",
            CollectionName::Templates => "Training script templates and worked examples",
            CollectionName::Threats => "Threat vector descriptions, impacts, and mitigations",
        }
    }

}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionName {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "papers" => Ok(CollectionName::Papers),
            "templates" => Ok(CollectionName::Templates),
            "threats" => Ok(CollectionName::Threats),
            other => Err(RetrievalError::UnknownCollection(other.to_string())),
        }
    }
}

pub const DEFAULT_SOURCE: &str = "unknown";

/// `type` value for documents that do not name one.
pub const DEFAULT_DOC_TYPE: &str = "document";

/// Normalized metadata persisted with every record.
///
/// Serializes to the JSON blob stored by backends. Optional fields are
/// omitted from the blob when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub date_added: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl DocumentMetadata {
    /// Apply the defaults for `source`, `type`, and `date_added` and carry
    /// the optional fields through unchanged.
    pub fn normalize(input: &MetadataInput) -> Self {
        Self {
            source: input
                .source
                .clone()
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            doc_type: input
                .doc_type
                .clone()
                .unwrap_or_else(|| DEFAULT_DOC_TYPE.to_string()),
            date_added: input.date_added.clone().unwrap_or_default(),
            author: input.author.clone(),
            category: input.category.clone(),
            tags: input.tags.clone(),
            title: input.title.clone(),
        }
    }

    /// Serialize to the blob format stored by backends.
    pub fn to_json(&self) -> String {
        // Only strings and string lists; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse a stored metadata blob field by field.
    ///
    /// A field with an unexpected type is dropped on its own; the rest of
    /// the blob is kept. Numbers and booleans are read as their string
    /// form, and `tags` stored as a comma-separated string becomes a list.
    /// Blobs that are not a JSON object yield the defaults.
    pub fn from_stored(blob: &str) -> Self {
        let value = serde_json::from_str::<Value>(blob).unwrap_or(Value::Null);
        let field = |key: &str| value.get(key).and_then(scalar_string);

        Self::normalize(&MetadataInput {
            source: field("source"),
            doc_type: field("type"),
            date_added: field("date_added"),
            author: field("author"),
            category: field("category"),
            tags: value.get("tags").and_then(tag_list),
            title: field("title"),
        })
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn tag_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(scalar_string).collect()),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

/// Caller-supplied metadata. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataInput {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub date_added: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A document submitted for ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: MetadataInput,
}

impl NewDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            metadata: MetadataInput::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataInput) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A stored document as returned by `get_document_by_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Generate a fresh record id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
