//! Core data models shared by ingestion, storage, and retrieval.
//!
//! [`Document`] is the persisted record (one per uploaded file, chunks
//! embedded). [`DocumentSummary`] is the listing projection. [`ChunkMatch`]
//! and [`Source`] are transient and only live for one chat request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type discriminator carried by every record this system writes.
///
/// Other record kinds may share the same collection; listings filter on it.
pub const DOCUMENT_TYPE: &str = "document";

/// Prefix for minted document identifiers.
pub const DOCUMENT_ID_PREFIX: &str = "doc::";

/// Mint a fresh document identifier (`doc::<uuid>`).
pub fn new_document_id() -> String {
    format!("{}{}", DOCUMENT_ID_PREFIX, uuid::Uuid::new_v4())
}

/// A stored document with its parsed chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default = "epoch")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub element_count: u64,
    /// Starts at 1, bumped by exactly one per re-upload.
    #[serde(default)]
    pub version: u32,
    /// Collection tag, e.g. `knowledge-base.bpt-docs`.
    #[serde(rename = "_type", default)]
    pub doc_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chunks: Vec<DocumentChunk>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

impl Document {
    /// A fresh document skeleton stamped with the current time.
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            record_type: DOCUMENT_TYPE.to_string(),
            filename: filename.into(),
            display_name: String::new(),
            file_url: String::new(),
            content_type: String::new(),
            uploaded_at: now,
            updated_at: now,
            element_count: 0,
            version: 0,
            doc_type: String::new(),
            category: String::new(),
            description: String::new(),
            chunks: Vec::new(),
        }
    }

    /// Listing projection of this document.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            display_name: self.display_name.clone(),
            file_url: self.file_url.clone(),
            uploaded_at: self.uploaded_at,
            updated_at: self.updated_at,
            element_count: self.element_count,
            version: self.version,
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }
}

/// An extracted text unit with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    #[serde(default)]
    pub chunk_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub chunk_type: String,
    /// Free-form; usually carries `source` (filename) and `page`.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub vector: Vec<f32>,
}

/// Metadata-only view of a [`Document`], as returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default = "epoch")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub element_count: u64,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update applied to a stored document.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub category: Option<String>,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.description.is_none()
            && self.display_name.is_none()
            && self.updated_at.is_none()
    }
}

/// A chunk retrieved by similarity search. Never persisted.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ChunkMatch {
    pub text: String,
    /// Source filename; empty when no extraction tier could recover it.
    pub source: String,
    /// 1-based page number, 0 when unknown.
    pub page: u32,
}

/// A cited source in a chat response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Source {
    pub filename: String,
    pub page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id_prefix_and_uniqueness() {
        let a = new_document_id();
        let b = new_document_id();
        assert!(a.starts_with("doc::"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_document_json_field_names() {
        let mut doc = Document::new("doc::1", "manual.pdf");
        doc.doc_type = "knowledge-base.bpt-docs".to_string();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["type"], "document");
        assert_eq!(value["_type"], "knowledge-base.bpt-docs");
        assert_eq!(value["filename"], "manual.pdf");
        assert!(value["chunks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_document_tolerates_sparse_record() {
        let doc: Document = serde_json::from_value(json!({
            "id": "doc::sparse",
            "chunks": [{ "text": "hello", "type": "text" }]
        }))
        .unwrap();
        assert_eq!(doc.version, 0);
        assert_eq!(doc.chunks[0].chunk_type, "text");
        assert!(doc.chunks[0].metadata.is_empty());
    }
}
