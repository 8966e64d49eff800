//! In-memory [`DocumentStore`] implementation for tests and local runs.
//!
//! Records are kept as raw JSON values behind a `std::sync::RwLock`, the
//! way a document collection holds them, so records of other kinds can
//! share the collection. Vector search is brute-force cosine similarity
//! over every chunk vector, and hits are rendered in a configurable
//! [`RowLayout`] to mimic the response shapes a real search service emits.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::models::{Document, DocumentPatch, DocumentSummary, DOCUMENT_TYPE};

use super::{DocumentStore, SearchRow, VectorQuery};

/// How [`InMemoryStore::vector_search`] renders the fields of each hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowLayout {
    /// Flattened `chunks.text` / `chunks.metadata.*` keys.
    #[default]
    Dotted,
    /// A `chunks` array holding the matched chunk object.
    Nested,
    /// No fields at all, only the document identifier.
    IdOnly,
}

/// In-memory document collection.
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Value>>,
    layout: RowLayout,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_layout(RowLayout::default())
    }

    pub fn with_layout(layout: RowLayout) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            layout,
        }
    }

    /// Store an arbitrary JSON record, bypassing the document model.
    ///
    /// Used to seed records of other kinds into the collection.
    pub fn insert_raw(&self, id: &str, record: Value) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(id.to_string(), record);
        Ok(())
    }

    /// Number of records of any kind.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn render_fields(layout: RowLayout, chunk: &Value) -> Map<String, Value> {
    let mut fields = Map::new();
    match layout {
        RowLayout::Dotted => {
            fields.insert("chunks.text".to_string(), chunk["text"].clone());
            if let Some(source) = chunk.pointer("/metadata/source") {
                fields.insert("chunks.metadata.source".to_string(), source.clone());
            }
            if let Some(page) = chunk.pointer("/metadata/page") {
                fields.insert("chunks.metadata.page".to_string(), page.clone());
            }
        }
        RowLayout::Nested => {
            fields.insert(
                "chunks".to_string(),
                json!([{ "text": chunk["text"], "metadata": chunk["metadata"] }]),
            );
        }
        RowLayout::IdOnly => {}
    }
    fields
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        match records.get(id) {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        let record = serde_json::to_value(doc)?;
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(doc.id.clone(), record);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        Ok(records.remove(id).is_some())
    }

    async fn list_by_type(&self, record_type: &str) -> Result<Vec<DocumentSummary>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut summaries: Vec<DocumentSummary> = records
            .values()
            .filter(|r| r.get("type").and_then(Value::as_str) == Some(record_type))
            .filter_map(|r| serde_json::from_value::<DocumentSummary>(r.clone()).ok())
            .collect();
        summaries.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(summaries)
    }

    async fn update(&self, id: &str, patch: &DocumentPatch) -> Result<u64> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let Some(record) = records.get_mut(id).and_then(Value::as_object_mut) else {
            return Ok(0);
        };
        if let Some(ref category) = patch.category {
            record.insert("category".to_string(), json!(category));
        }
        if let Some(ref description) = patch.description {
            record.insert("description".to_string(), json!(description));
        }
        if let Some(ref name) = patch.display_name {
            record.insert("display_name".to_string(), json!(name));
        }
        if let Some(ts) = patch.updated_at {
            record.insert("updated_at".to_string(), serde_json::to_value(ts)?);
        }
        Ok(1)
    }

    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchRow>> {
        let records = self.records.read().map_err(|_| poisoned())?;

        struct Hit<'r> {
            doc_id: &'r str,
            chunk: &'r Value,
            score: f32,
        }

        let mut hits: Vec<Hit<'_>> = Vec::new();
        for (doc_id, record) in records.iter() {
            if record.get("type").and_then(Value::as_str) != Some(DOCUMENT_TYPE) {
                continue;
            }
            let Some(chunks) = record.get("chunks").and_then(Value::as_array) else {
                continue;
            };
            for chunk in chunks {
                let vector: Vec<f32> = chunk
                    .get("vector")
                    .and_then(Value::as_array)
                    .map(|v| v.iter().filter_map(Value::as_f64).map(|x| x as f32).collect())
                    .unwrap_or_default();
                hits.push(Hit {
                    doc_id,
                    chunk,
                    score: cosine_sim(query.vector, &vector),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(query.num_candidates.min(query.limit));

        Ok(hits
            .into_iter()
            .map(|hit| SearchRow {
                id: hit.doc_id.to_string(),
                score: hit.score as f64,
                fields: render_fields(self.layout, hit.chunk),
            })
            .collect())
    }
}
