//! Storage abstraction for Knowledge Center.
//!
//! The [`DocumentStore`] trait covers everything the repository and the
//! similarity search need from the external document database: point
//! reads and writes by identifier, filtered listing and partial updates,
//! and a vector-similarity query scoped to a named index.
//!
//! Implementations must be `Send + Sync`; one instance is shared by all
//! in-flight requests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{Document, DocumentPatch, DocumentSummary};

/// Which fields a vector query asks the database to return per hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldProjection {
    /// Every stored field (`["*"]`). Tolerant of schema drift.
    #[default]
    All,
    /// Only the listed field paths. Cheaper, but brittle when the index
    /// mapping changes.
    Named(Vec<String>),
}

impl FieldProjection {
    /// Field list as sent on the wire.
    pub fn to_fields(&self) -> Vec<String> {
        match self {
            FieldProjection::All => vec!["*".to_string()],
            FieldProjection::Named(fields) => fields.clone(),
        }
    }

    /// Build from a configured list; `["*"]` or an empty list means all.
    pub fn from_fields(fields: &[String]) -> Self {
        if fields.is_empty() || fields.iter().any(|f| f == "*") {
            FieldProjection::All
        } else {
            FieldProjection::Named(fields.to_vec())
        }
    }
}

/// A single vector-similarity request.
#[derive(Debug, Clone)]
pub struct VectorQuery<'a> {
    /// Indexed field holding chunk vectors (e.g. `chunks.vector`).
    pub field: &'a str,
    pub vector: &'a [f32],
    /// Nearest-neighbour candidates the engine considers (`k`).
    pub num_candidates: usize,
    /// Maximum rows returned.
    pub limit: usize,
    pub projection: &'a FieldProjection,
}

/// One hit as returned by the database, before reconciliation.
///
/// `fields` is loosely typed on purpose: depending on the projection and
/// the index mapping it may hold flattened dotted paths, nested arrays,
/// or nothing at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    /// Identifier of the parent document.
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Abstract document database.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](DocumentStore::get) | Point read by identifier |
/// | [`upsert`](DocumentStore::upsert) | Insert or replace by identifier |
/// | [`remove`](DocumentStore::remove) | Delete by identifier |
/// | [`list_by_type`](DocumentStore::list_by_type) | Summaries filtered on the type discriminator |
/// | [`update`](DocumentStore::update) | Parameterized partial update |
/// | [`vector_search`](DocumentStore::vector_search) | Similarity query on a named index |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by identifier. `Ok(None)` when absent.
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Insert or replace the document under `doc.id`.
    async fn upsert(&self, doc: &Document) -> Result<()>;

    /// Delete a document. Returns whether a record existed.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Summaries of all records whose `type` equals `record_type`, newest
    /// upload first.
    async fn list_by_type(&self, record_type: &str) -> Result<Vec<DocumentSummary>>;

    /// Apply a partial update to the record with this identifier.
    ///
    /// Returns the number of records changed (0 when the id is unknown).
    async fn update(&self, id: &str, patch: &DocumentPatch) -> Result<u64>;

    /// Run a vector-similarity query, rows in the engine's relevance order.
    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_from_fields() {
        assert_eq!(FieldProjection::from_fields(&[]), FieldProjection::All);
        assert_eq!(
            FieldProjection::from_fields(&["*".to_string()]),
            FieldProjection::All
        );
        let named = FieldProjection::from_fields(&["chunks.text".to_string()]);
        assert_eq!(named.to_fields(), vec!["chunks.text".to_string()]);
    }
}
