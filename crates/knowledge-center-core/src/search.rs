//! Similarity search and result reconciliation.
//!
//! Ranking happens entirely inside the database; this module issues one
//! vector query and turns each loosely-typed hit into a [`ChunkMatch`].
//!
//! # Reconciliation
//!
//! A hit can arrive in several shapes depending on the field projection
//! and the index mapping. Each known shape is a [`ResponseShape`] variant,
//! tried in this order, every tier only filling fields still empty:
//!
//! 1. [`ResponseShape::DottedPath`]: flattened `chunks.text`,
//!    `chunks.metadata.source`, `chunks.metadata.page` keys.
//! 2. [`ResponseShape::NestedArray`]: a `chunks` array of objects, first
//!    element only.
//! 3. [`ResponseShape::ParentDocument`]: when the source is still empty,
//!    a point read of the parent document, chunk 0 only.
//!
//! Rows that yield no text are dropped. Rows with text but no source are
//! kept with an empty source. Missing fields and failed lookups degrade to
//! defaults; only the query itself can fail the search.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{ChunkMatch, Document};
use crate::store::{DocumentStore, FieldProjection, SearchRow, VectorQuery};

/// Default number of matches handed to answer generation.
pub const DEFAULT_LIMIT: usize = 3;

const DOTTED_TEXT: &str = "chunks.text";
const DOTTED_SOURCE: &str = "chunks.metadata.source";
const DOTTED_PAGE: &str = "chunks.metadata.page";
const NESTED_CHUNKS: &str = "chunks";

/// Retrieval parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Indexed vector field.
    pub vector_field: String,
    /// Nearest-neighbour candidates considered by the engine.
    pub num_candidates: usize,
    /// Maximum matches returned.
    pub limit: usize,
    pub projection: FieldProjection,
    /// Read the parent document when a hit carries no source.
    pub lookup_missing_source: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            vector_field: "chunks.vector".to_string(),
            num_candidates: DEFAULT_LIMIT,
            limit: DEFAULT_LIMIT,
            projection: FieldProjection::All,
            lookup_missing_source: true,
        }
    }
}

/// A known shape of search output, in fallback order.
#[derive(Debug, Clone, Copy)]
pub enum ResponseShape<'a> {
    /// Flattened dotted-path keys on the hit.
    DottedPath(&'a Map<String, Value>),
    /// First element of a nested `chunks` array on the hit.
    NestedArray(&'a Map<String, Value>),
    /// Full parent document from a secondary lookup.
    ParentDocument(&'a Document),
}

impl<'a> ResponseShape<'a> {
    /// Shapes recognisable directly on a hit's fields, in priority order.
    pub fn from_row(fields: &'a Map<String, Value>) -> Vec<ResponseShape<'a>> {
        let mut shapes = vec![ResponseShape::DottedPath(fields)];
        if let Some(first) = fields
            .get(NESTED_CHUNKS)
            .and_then(Value::as_array)
            .and_then(|chunks| chunks.first())
            .and_then(Value::as_object)
        {
            shapes.push(ResponseShape::NestedArray(first));
        }
        shapes
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseShape::DottedPath(_) => "dotted-path",
            ResponseShape::NestedArray(_) => "nested-array",
            ResponseShape::ParentDocument(_) => "parent-document",
        }
    }

    /// Pull whatever text, source, and page this shape carries.
    pub fn extract(&self) -> Extracted {
        match self {
            ResponseShape::DottedPath(fields) => Extracted {
                text: text_of(fields.get(DOTTED_TEXT)),
                source: text_of(fields.get(DOTTED_SOURCE)),
                page: page_of(fields.get(DOTTED_PAGE)),
            },
            ResponseShape::NestedArray(chunk) => {
                let metadata = chunk.get("metadata").and_then(Value::as_object);
                Extracted {
                    text: text_of(chunk.get("text")),
                    source: text_of(metadata.and_then(|m| m.get("source"))),
                    page: page_of(metadata.and_then(|m| m.get("page"))),
                }
            }
            ResponseShape::ParentDocument(doc) => match doc.chunks.first() {
                Some(chunk) => Extracted {
                    text: chunk.text.clone(),
                    source: text_of(chunk.metadata.get("source")),
                    page: page_of(chunk.metadata.get("page")),
                },
                None => Extracted::default(),
            },
        }
    }
}

/// Fields recovered from one or more shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub source: String,
    pub page: u32,
}

impl Extracted {
    /// Fill any empty field from `other`; populated fields win.
    pub fn fill_from(&mut self, other: Extracted) {
        if self.text.is_empty() {
            self.text = other.text;
        }
        if self.source.is_empty() {
            self.source = other.source;
        }
        if self.page == 0 {
            self.page = other.page;
        }
    }

    /// `None` when no text was found.
    pub fn into_match(self) -> Option<ChunkMatch> {
        if self.text.is_empty() {
            return None;
        }
        Some(ChunkMatch {
            text: self.text,
            source: self.source,
            page: self.page,
        })
    }
}

/// Flattened array fields carry one value per nested element; take the first.
fn first_scalar(value: Option<&Value>) -> Option<&Value> {
    match value? {
        Value::Array(items) => items.first(),
        Value::Null => None,
        other => Some(other),
    }
}

fn text_of(value: Option<&Value>) -> String {
    first_scalar(value)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Pages are only trusted when the stored value is a non-negative whole number.
fn page_of(value: Option<&Value>) -> u32 {
    let Some(value) = first_scalar(value) else {
        return 0;
    };
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).unwrap_or(0);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => {
            f as u32
        }
        _ => 0,
    }
}

/// Run the row-local tiers (dotted path, then nested array).
pub fn reconcile_fields(fields: &Map<String, Value>) -> Extracted {
    let mut extracted = Extracted::default();
    for shape in ResponseShape::from_row(fields) {
        extracted.fill_from(shape.extract());
    }
    extracted
}

/// Reconcile one hit, falling back to a parent-document lookup for a
/// missing source when `lookup_missing_source` is set.
pub async fn reconcile_row<S: DocumentStore + ?Sized>(
    store: &S,
    row: &SearchRow,
    lookup_missing_source: bool,
) -> Option<ChunkMatch> {
    let mut extracted = reconcile_fields(&row.fields);

    if extracted.source.is_empty() && lookup_missing_source && !row.id.is_empty() {
        match store.get(&row.id).await {
            Ok(Some(doc)) => {
                let shape = ResponseShape::ParentDocument(&doc);
                debug!(id = %row.id, shape = shape.name(), "filling hit from parent document");
                extracted.fill_from(shape.extract());
            }
            Ok(None) => debug!(id = %row.id, "parent document not found for hit"),
            Err(e) => debug!(id = %row.id, error = %e, "parent document lookup failed"),
        }
    }

    if extracted.text.is_empty() {
        debug!(id = %row.id, "dropping hit with no extractable text");
    }
    extracted.into_match()
}

/// Find the chunks most similar to `vector`.
///
/// Results keep the engine's ranking and are capped at `params.limit`.
pub async fn search_similar_chunks<S: DocumentStore + ?Sized>(
    store: &S,
    vector: &[f32],
    params: &SearchParams,
) -> Result<Vec<ChunkMatch>> {
    let query = VectorQuery {
        field: &params.vector_field,
        vector,
        num_candidates: params.num_candidates,
        limit: params.limit,
        projection: &params.projection,
    };
    let rows = store
        .vector_search(&query)
        .await
        .context("vector search query failed")?;

    let mut matches = Vec::with_capacity(rows.len().min(params.limit));
    for row in rows.iter().take(params.limit) {
        if let Some(m) = reconcile_row(store, row, params.lookup_missing_source).await {
            matches.push(m);
        }
    }
    Ok(matches)
}
