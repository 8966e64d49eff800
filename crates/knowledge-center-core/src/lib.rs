//! # Knowledge Center Core
//!
//! Runtime-agnostic logic for Knowledge Center: the document model, the
//! [`store::DocumentStore`] abstraction, repository operations, similarity
//! search result reconciliation, and answer composition.
//!
//! This crate contains no tokio, HTTP client, or other I/O dependencies.
//! Concrete stores (Couchbase) and service clients live in the
//! `knowledge-center` app crate.

pub mod answer;
pub mod models;
pub mod repository;
pub mod search;
pub mod store;
