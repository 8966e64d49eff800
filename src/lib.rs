//! # Knowledge Center
//!
//! Retrieval-augmented question answering over uploaded documents.
//!
//! Files are uploaded over HTTP, stored in S3-compatible object storage,
//! split and embedded by an external parser, and persisted with their
//! chunk vectors in Couchbase. Questions are embedded, matched against the
//! stored chunks with a vector search, and answered by Gemini using only
//! the matched text.
//!
//! ## Architecture
//!
//! ```text
//!  upload ─▶ ┌──────────┐   ┌─────────┐   ┌───────────┐
//!            │ S3 store │──▶│ parser  │──▶│ Couchbase │
//!            └──────────┘   └─────────┘   └─────┬─────┘
//!                                               │ knn
//!  chat ───▶ ┌──────────┐                 ┌─────▼─────┐   ┌────────┐
//!            │ embedder │────────────────▶│  search   │──▶│ Gemini │
//!            └──────────┘                 └───────────┘   └────────┘
//! ```
//!
//! Domain types, the storage trait, retrieval and answer composition live
//! in the `knowledge-center-core` crate; this crate adds the HTTP clients,
//! configuration, and the server.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Defaults, TOML file, and environment overlay |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | HTTP error envelope |
//! | [`traits`] | Service seams (object store, parser, embedder, generator) |
//! | [`couchbase`] | Couchbase Query/Search REST document store |
//! | [`storage`] | S3 `PutObject` with SigV4 signing |
//! | [`parser`] | Parser service client |
//! | [`embedding`] | Embedding service client |
//! | [`generation`] | Gemini client |
//! | [`services`] | Shared client handles |
//! | [`ingest`] | Upload ingestion |
//! | [`chat`] | Question answering |
//! | [`documents`] | Document listing (CLI) |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod config;
pub mod couchbase;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod logging;
pub mod parser;
pub mod server;
pub mod services;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;
