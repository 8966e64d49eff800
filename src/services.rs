//! Shared service handles.
//!
//! [`AppServices`] owns one long-lived client per collaborator and is
//! shared by every request handler and CLI command.

use anyhow::Result;
use std::sync::Arc;

use knowledge_center_core::search::SearchParams;
use knowledge_center_core::store::{DocumentStore, FieldProjection};

use crate::config::Config;
use crate::couchbase::CouchbaseStore;
use crate::embedding::HttpEmbedder;
use crate::generation::GeminiGenerator;
use crate::parser::HttpParser;
use crate::storage::S3Storage;
use crate::traits::{AnswerGenerator, DocumentParser, Embedder, ObjectStore};

pub struct AppServices {
    pub store: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub parser: Arc<dyn DocumentParser>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn AnswerGenerator>,
    pub search: SearchParams,
    /// `{scope}.{collection}` tag written on every document.
    pub doc_type: String,
}

impl AppServices {
    /// Build the real HTTP-backed clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            store: Arc::new(CouchbaseStore::new(&config.database)?),
            objects: Arc::new(S3Storage::new(&config.storage)?),
            parser: Arc::new(HttpParser::new(&config.parser)?),
            embedder: Arc::new(HttpEmbedder::new(&config.embedding)?),
            generator: Arc::new(GeminiGenerator::new(&config.generation)?),
            search: search_params(config),
            doc_type: doc_type(config),
        })
    }
}

pub fn search_params(config: &Config) -> SearchParams {
    SearchParams {
        vector_field: config.database.vector_field.clone(),
        num_candidates: config.search.num_candidates,
        limit: config.search.limit,
        projection: FieldProjection::from_fields(&config.search.fields),
        lookup_missing_source: config.search.lookup_missing_source,
    }
}

pub fn doc_type(config: &Config) -> String {
    format!(
        "{}.{}",
        config.database.scope.as_deref().unwrap_or_default(),
        config.database.collection
    )
}
