//! Service seams.
//!
//! Each external collaborator (object storage, document parser, embedding
//! service, answer generator) sits behind a trait so the HTTP layer and the
//! CLI can run against the real HTTP clients or against in-process stubs.
//!
//! ```text
//!   upload ──► ObjectStore ──► DocumentParser ──► DocumentStore
//!   chat   ──► Embedder ──► DocumentStore (vector search) ──► AnswerGenerator
//! ```
//!
//! The document store trait lives in `knowledge_center_core::store`.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::parser::ParsedDocument;

/// Stores raw uploaded bytes and hands back a retrievable URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<String>;
}

/// Splits a file into typed, embedded elements.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, filename: &str, content_type: &str, data: Bytes) -> Result<ParsedDocument>;
}

/// Turns text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces a natural-language answer from a prompt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// `Ok(None)` when generation is unavailable (for example, no API key).
    async fn generate(&self, prompt: &str) -> Result<Option<String>>;
}
