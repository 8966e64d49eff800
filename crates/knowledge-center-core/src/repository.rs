//! Document repository operations.
//!
//! Thin policy layer over a [`DocumentStore`]: applies save defaults,
//! validates inputs, and keeps listings restricted to document records.

use anyhow::{bail, Result};
use chrono::Utc;

use crate::models::{
    new_document_id, Document, DocumentPatch, DocumentSummary, DOCUMENT_TYPE,
};
use crate::store::DocumentStore;

/// Persist a document (insert or replace by id).
///
/// Fills in defaults before writing: a minted id when empty, the
/// `"document"` discriminator, version 1 when unset, and the filename as
/// display name when none was given.
pub async fn save_document<S: DocumentStore + ?Sized>(store: &S, doc: &mut Document) -> Result<()> {
    if doc.id.is_empty() {
        doc.id = new_document_id();
    }
    doc.record_type = DOCUMENT_TYPE.to_string();
    if doc.version == 0 {
        doc.version = 1;
    }
    if doc.display_name.trim().is_empty() {
        doc.display_name = doc.filename.clone();
    }
    store.upsert(doc).await
}

pub async fn get_document<S: DocumentStore + ?Sized>(store: &S, id: &str) -> Result<Option<Document>> {
    store.get(id).await
}

/// All document records, newest upload first. Other record kinds sharing
/// the collection are never returned.
pub async fn list_documents<S: DocumentStore + ?Sized>(store: &S) -> Result<Vec<DocumentSummary>> {
    store.list_by_type(DOCUMENT_TYPE).await
}

/// Set category and description. Unknown ids are a silent no-op.
pub async fn update_metadata<S: DocumentStore + ?Sized>(
    store: &S,
    id: &str,
    category: &str,
    description: &str,
) -> Result<u64> {
    let patch = DocumentPatch {
        category: Some(category.to_string()),
        description: Some(description.to_string()),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    store.update(id, &patch).await
}

/// Rename a document. The new name must not be blank.
pub async fn update_display_name<S: DocumentStore + ?Sized>(
    store: &S,
    id: &str,
    display_name: &str,
) -> Result<u64> {
    let name = display_name.trim();
    if name.is_empty() {
        bail!("display name must not be empty");
    }
    let patch = DocumentPatch {
        display_name: Some(name.to_string()),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    store.update(id, &patch).await
}

/// Delete a document and, with it, all of its chunks.
pub async fn delete_document<S: DocumentStore + ?Sized>(store: &S, id: &str) -> Result<bool> {
    store.remove(id).await
}
