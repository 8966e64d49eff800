//! Upload ingestion.
//!
//! One uploaded file flows through: optional replacement of an existing
//! record → object storage → parser → document store.
//!
//! Re-uploading under an existing `document_id` deletes the old record
//! first so its chunks leave the vector index, then writes the replacement
//! under the same id with the version bumped. The delete is not rolled back
//! if a later step fails.

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use knowledge_center_core::models::Document;
use knowledge_center_core::repository::{delete_document, get_document, save_document};

use crate::error::ApiError;
use crate::services::AppServices;
use crate::storage::resolve_content_type;

pub const INGEST_SUCCESS_MESSAGE: &str = "Ingestion successful";

/// A file received from a client.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub filename: String,
    /// Type declared on the multipart part, if any.
    pub content_type: Option<String>,
    pub data: Bytes,
    pub display_name: Option<String>,
    /// Existing document to replace.
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestResponse {
    pub message: String,
    pub id: String,
    pub url: String,
    /// Element count reported by the parser.
    pub count: u64,
    pub version: u32,
}

pub async fn ingest_upload(services: &AppServices, req: UploadRequest) -> Result<IngestResponse, ApiError> {
    let filename = req.filename.trim().to_string();
    if filename.is_empty() {
        return Err(ApiError::bad_request("uploaded file has no filename"));
    }

    let replaced = match non_blank(req.document_id) {
        Some(id) => replace_existing(services, &id).await?,
        None => None,
    };

    let content_type = resolve_content_type(req.content_type.as_deref(), &filename);
    let url = services
        .objects
        .put(&filename, &content_type, req.data.clone())
        .await
        .map_err(|e| ApiError::upstream("storage", e))?;

    let parsed = services
        .parser
        .parse(&filename, &content_type, req.data)
        .await
        .map_err(|e| ApiError::upstream("parser", e))?;

    let (id, version) = match replaced {
        Some((id, previous)) => (id, previous.saturating_add(1)),
        None => (String::new(), 1),
    };

    let mut doc = Document::new(id, filename.clone());
    doc.version = version;
    doc.display_name = non_blank(req.display_name).unwrap_or_else(|| filename.clone());
    doc.file_url = url;
    doc.content_type = if parsed.content_type.is_empty() {
        content_type
    } else {
        parsed.content_type
    };
    doc.element_count = parsed.element_count;
    doc.doc_type = services.doc_type.clone();
    doc.chunks = parsed.data.into_iter().map(|e| e.into_chunk()).collect();

    save_document(services.store.as_ref(), &mut doc)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;

    info!(
        id = %doc.id,
        filename = %doc.filename,
        version = doc.version,
        chunks = doc.chunks.len(),
        "ingested document"
    );

    Ok(IngestResponse {
        message: INGEST_SUCCESS_MESSAGE.to_string(),
        id: doc.id,
        url: doc.file_url,
        count: doc.element_count,
        version: doc.version,
    })
}

/// Look up and delete the record being replaced.
///
/// Returns its id and version, or `None` when no such record exists.
async fn replace_existing(services: &AppServices, id: &str) -> Result<Option<(String, u32)>, ApiError> {
    let existing = get_document(services.store.as_ref(), id)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;
    let Some(existing) = existing else {
        return Ok(None);
    };

    if let Err(e) = delete_document(services.store.as_ref(), id).await {
        warn!(id, error = %e, "failed to delete previous version before re-upload");
    }
    Ok(Some((existing.id, existing.version)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
