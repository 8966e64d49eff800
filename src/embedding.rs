//! Client for the external embedding service.
//!
//! `POST {url}` with `{"text": "..."}` returns `{"vector": [...]}`. One
//! question is embedded per chat request. Failures are not retried; the
//! chat request fails instead.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EmbeddingConfig;
use crate::traits::Embedder;

pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build embedding HTTP client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| anyhow!("embedding service unreachable at {}: {}", self.url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("embedding service error {}: {}", status, body);
        }

        let json: Value = resp.json().await.context("embedding response is not JSON")?;
        parse_embed_response(&json)
    }
}

fn parse_embed_response(json: &Value) -> Result<Vec<f32>> {
    let values = json
        .get("vector")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("invalid embedding response: missing vector array"))?;

    let vector = values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("invalid embedding response: non-numeric component"))
        })
        .collect::<Result<Vec<f32>>>()?;

    if vector.is_empty() {
        bail!("invalid embedding response: empty vector");
    }
    Ok(vector)
}
