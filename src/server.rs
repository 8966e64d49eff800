//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/documents/upload` | Upload and ingest a file (multipart) |
//! | `POST` | `/api/upload` | Alias of the above |
//! | `GET`  | `/api/documents` | List documents, newest first |
//! | `PUT`  | `/api/documents/{id}` | Set category and description |
//! | `PATCH`| `/api/documents/{id}/name` | Rename a document |
//! | `DELETE` | `/api/documents/{id}` | Delete a document and its chunks |
//! | `POST` | `/api/chat` | Ask a question |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Errors use the envelope described in [`crate::error`]. Updates and
//! deletes of unknown ids succeed without effect.
//!
//! # CORS
//!
//! Only the origins listed in `[server].cors_origins` are allowed.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, HeaderValue, Method},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use knowledge_center_core::models::DocumentSummary;
use knowledge_center_core::repository::{delete_document, list_documents, update_display_name, update_metadata};

use crate::chat::{answer_question, ChatRequest, ChatResponse};
use crate::config::{Config, ServerConfig};
use crate::error::ApiError;
use crate::ingest::{ingest_upload, IngestResponse, UploadRequest};
use crate::services::AppServices;

pub const DOCUMENT_UPDATED_MESSAGE: &str = "Document updated successfully";
pub const DOCUMENT_RENAMED_MESSAGE: &str = "Document name updated successfully";
pub const DOCUMENT_DELETED_MESSAGE: &str = "Document deleted successfully";

type AppState = Arc<AppServices>;

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Arc::new(AppServices::from_config(config)?);
    let app = router(services, &config.server)?;

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        generation = config.generation.is_enabled(),
        "knowledge center listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Builds the router over an already-constructed set of services.
pub fn router(services: Arc<AppServices>, config: &ServerConfig) -> anyhow::Result<Router> {
    let origins = config
        .cors_origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).map_err(|_| anyhow::anyhow!("invalid CORS origin: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE]);

    Ok(Router::new()
        .route("/api/documents/upload", post(handle_upload))
        .route("/api/upload", post(handle_upload))
        .route("/api/documents", get(handle_list))
        .route("/api/documents/{id}", put(handle_update).delete(handle_delete))
        .route("/api/documents/{id}/name", patch(handle_rename))
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(config.max_upload_mb.saturating_mul(1024 * 1024)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(services))
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e.body_text())))
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::bad_request(format!("invalid multipart body: {}", e.body_text()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /api/documents/upload ============

async fn handle_upload(
    State(services): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut multipart = multipart
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e.body_text())))?;
    let mut req = UploadRequest::default();
    let mut has_file = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                req.filename = field.file_name().unwrap_or_default().to_string();
                req.content_type = field.content_type().map(str::to_string);
                req.data = field.bytes().await.map_err(multipart_error)?;
                has_file = true;
            }
            Some("display_name") => {
                req.display_name = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("document_id") => {
                req.document_id = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    if !has_file {
        return Err(ApiError::bad_request("No file uploaded"));
    }
    Ok(Json(ingest_upload(&services, req).await?))
}

// ============ GET /api/documents ============

async fn handle_list(State(services): State<AppState>) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let docs = list_documents(services.store.as_ref())
        .await
        .map_err(|e| ApiError::upstream("database", e))?;
    Ok(Json(docs))
}

// ============ PUT /api/documents/{id} ============

#[derive(Deserialize)]
struct UpdateMetadataRequest {
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
}

async fn handle_update(
    State(services): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateMetadataRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let body = json_body(body)?;
    update_metadata(services.store.as_ref(), &id, &body.category, &body.description)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;
    Ok(Json(MessageResponse {
        message: DOCUMENT_UPDATED_MESSAGE,
    }))
}

// ============ PATCH /api/documents/{id}/name ============

#[derive(Deserialize)]
struct RenameRequest {
    #[serde(default)]
    display_name: String,
}

async fn handle_rename(
    State(services): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let body = json_body(body)?;
    if body.display_name.trim().is_empty() {
        return Err(ApiError::bad_request("display_name must not be empty"));
    }
    update_display_name(services.store.as_ref(), &id, &body.display_name)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;
    Ok(Json(MessageResponse {
        message: DOCUMENT_RENAMED_MESSAGE,
    }))
}

// ============ DELETE /api/documents/{id} ============

async fn handle_delete(
    State(services): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let existed = delete_document(services.store.as_ref(), &id)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;
    if existed {
        info!(id = %id, "deleted document");
    }
    Ok(Json(MessageResponse {
        message: DOCUMENT_DELETED_MESSAGE,
    }))
}

// ============ POST /api/chat ============

async fn handle_chat(
    State(services): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let body = json_body(body)?;
    Ok(Json(answer_question(&services, &body.message).await?))
}
