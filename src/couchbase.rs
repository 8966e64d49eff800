//! Couchbase-backed [`DocumentStore`].
//!
//! Talks to two Couchbase services over their REST APIs:
//!
//! | Service | Endpoint | Used for |
//! |---------|----------|----------|
//! | Query (SQL++) | `POST {query_url}/query/service` | reads, writes, listing, updates |
//! | Search (FTS)  | `POST {search_url}/api/bucket/{b}/scope/{s}/index/{i}/query` | vector similarity |
//!
//! All statements are parameterized; identifiers and values never get
//! spliced into SQL++ text. Queries run with `request_plus` consistency so
//! a write is visible to the next listing.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use knowledge_center_core::models::{Document, DocumentPatch, DocumentSummary};
use knowledge_center_core::store::{DocumentStore, SearchRow, VectorQuery};

use crate::config::{required, DatabaseConfig};

pub struct CouchbaseStore {
    client: reqwest::Client,
    query_url: String,
    search_url: String,
    username: String,
    password: String,
    bucket: String,
    scope: String,
    index: String,
    keyspace: String,
}

impl CouchbaseStore {
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let bucket = required(&config.bucket, "DB_BUCKET")?.to_string();
        let scope = required(&config.scope, "DB_SCOPE")?.to_string();
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build database HTTP client")?;
        Ok(Self {
            client,
            query_url: required(&config.query_url, "DB_QUERY_URL")?
                .trim_end_matches('/')
                .to_string(),
            search_url: required(&config.search_url, "DB_SEARCH_URL")?
                .trim_end_matches('/')
                .to_string(),
            username: required(&config.username, "DB_USERNAME")?.to_string(),
            password: required(&config.password, "DB_PASSWORD")?.to_string(),
            keyspace: keyspace(&bucket, &scope, &config.collection),
            bucket,
            scope,
            index: config.search_index.clone(),
        })
    }

    /// Run one SQL++ statement and return its result rows.
    async fn query(&self, statement: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        debug!(statement, "running query");
        let body = json!({
            "statement": statement,
            "args": args,
            "scan_consistency": "request_plus",
        });
        let resp = self
            .client
            .post(format!("{}/query/service", self.query_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .context("query service request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("failed to read query response")?;
        decode_query_response(status, &text)
    }

    fn search_endpoint(&self) -> String {
        format!(
            "{}/api/bucket/{}/scope/{}/index/{}/query",
            self.search_url, self.bucket, self.scope, self.index
        )
    }
}

#[async_trait]
impl DocumentStore for CouchbaseStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let statement = format!(
            "SELECT d.*, META(d).id AS id FROM {} AS d USE KEYS $1",
            self.keyspace
        );
        let rows = self.query(&statement, vec![json!(id)]).await?;
        match rows.into_iter().next() {
            Some(row) => {
                let doc = serde_json::from_value(row)
                    .with_context(|| format!("document {} has an unexpected shape", id))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        let statement = format!("UPSERT INTO {} (KEY, VALUE) VALUES ($1, $2)", self.keyspace);
        let value = serde_json::to_value(doc)?;
        self.query(&statement, vec![json!(doc.id), value]).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let statement = format!(
            "DELETE FROM {} AS d USE KEYS $1 RETURNING META(d).id",
            self.keyspace
        );
        let rows = self.query(&statement, vec![json!(id)]).await?;
        Ok(!rows.is_empty())
    }

    async fn list_by_type(&self, record_type: &str) -> Result<Vec<DocumentSummary>> {
        let statement = format!(
            "SELECT META(d).id AS id, d.filename, d.display_name, d.file_url, \
             d.uploaded_at, d.updated_at, d.element_count, d.version, \
             d.category, d.description \
             FROM {} AS d WHERE d.type = $1 \
             ORDER BY STR_TO_MILLIS(d.uploaded_at) DESC",
            self.keyspace
        );
        let rows = self.query(&statement, vec![json!(record_type)]).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(strip_nulls(row)).context("unexpected listing row"))
            .collect()
    }

    async fn update(&self, id: &str, patch: &DocumentPatch) -> Result<u64> {
        let Some((statement, args)) = update_statement(&self.keyspace, id, patch) else {
            return Ok(0);
        };
        let rows = self.query(&statement, args).await?;
        Ok(rows.len() as u64)
    }

    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchRow>> {
        let resp = self
            .client
            .post(self.search_endpoint())
            .basic_auth(&self.username, Some(&self.password))
            .json(&search_request_body(query))
            .send()
            .await
            .context("search service request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("failed to read search response")?;
        if !status.is_success() {
            bail!("search service returned HTTP {}: {}", status, truncate(&text, 300));
        }
        let body: Value = serde_json::from_str(&text).context("search response is not JSON")?;
        parse_search_hits(body)
    }
}

/// Envelope of a query service response.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    errors: Vec<QueryError>,
}

#[derive(Debug, Deserialize)]
struct QueryError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

impl QueryResponse {
    fn into_results(self) -> Result<Vec<Value>> {
        if let Some(first) = self.errors.first() {
            bail!("query failed ({}): {}", first.code, first.msg);
        }
        if !self.status.is_empty() && self.status != "success" {
            bail!("query finished with status {}", self.status);
        }
        Ok(self.results)
    }
}

/// Result rows of a query service reply.
///
/// Reported query errors win; any other non-2xx reply is a failure even
/// when its body decodes.
fn decode_query_response(status: StatusCode, text: &str) -> Result<Vec<Value>> {
    let parsed = serde_json::from_str::<QueryResponse>(text);
    if let Ok(QueryResponse { ref errors, .. }) = parsed {
        if let Some(first) = errors.first() {
            bail!("query failed ({}): {}", first.code, first.msg);
        }
    }
    if !status.is_success() {
        bail!("query service returned HTTP {}: {}", status, truncate(text, 300));
    }
    match parsed {
        Ok(parsed) => parsed.into_results(),
        Err(_) => bail!("query service returned HTTP {}: {}", status, truncate(text, 300)),
    }
}

/// Fully qualified, backtick-quoted `bucket.scope.collection`.
fn keyspace(bucket: &str, scope: &str, collection: &str) -> String {
    format!(
        "{}.{}.{}",
        quote_ident(bucket),
        quote_ident(scope),
        quote_ident(collection)
    )
}

fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Parameterized `UPDATE` for the fields present in `patch`.
///
/// `None` when the patch changes nothing.
fn update_statement(keyspace: &str, id: &str, patch: &DocumentPatch) -> Option<(String, Vec<Value>)> {
    if patch.is_empty() {
        return None;
    }
    let mut assignments = Vec::new();
    let mut args = vec![json!(id)];

    let fields: [(&str, Option<Value>); 4] = [
        ("category", patch.category.as_ref().map(|v| json!(v))),
        ("description", patch.description.as_ref().map(|v| json!(v))),
        ("display_name", patch.display_name.as_ref().map(|v| json!(v))),
        ("updated_at", patch.updated_at.map(|v| json!(v))),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            args.push(value);
            assignments.push(format!("d.{} = ${}", name, args.len()));
        }
    }

    let statement = format!(
        "UPDATE {} AS d USE KEYS $1 SET {} RETURNING META(d).id",
        keyspace,
        assignments.join(", ")
    );
    Some((statement, args))
}

/// Search service request for a single kNN clause.
fn search_request_body(query: &VectorQuery<'_>) -> Value {
    json!({
        "fields": query.projection.to_fields(),
        "knn": [{
            "field": query.field,
            "vector": query.vector,
            "k": query.num_candidates,
        }],
        "query": { "match_none": {} },
        "size": query.limit,
    })
}

fn parse_search_hits(body: Value) -> Result<Vec<SearchRow>> {
    if let Some(status) = body.get("status") {
        if let Some(errors) = status.get("errors").and_then(Value::as_object) {
            if let Some((partition, msg)) = errors.iter().next() {
                bail!("search failed on {}: {}", partition, msg);
            }
        }
    }
    let hits = match body.get("hits") {
        Some(Value::Array(hits)) => hits.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => bail!("unexpected hits value: {}", other),
    };
    hits.into_iter()
        .map(|hit| serde_json::from_value(hit).context("unexpected search hit"))
        .collect()
}

/// Drop explicit nulls so serde defaults apply.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
