//! Client for the external document parser.
//!
//! The parser accepts a multipart upload (field `file`) and returns the
//! document split into typed elements, each already embedded:
//!
//! ```json
//! {
//!   "filename": "handbook.pdf",
//!   "content_type": "application/pdf",
//!   "element_count": 2,
//!   "data": [
//!     { "element_id": "p1_b0", "type": "text", "text": "...",
//!       "metadata": { "source": "handbook.pdf", "page": 1 }, "vector": [0.1, ...] }
//!   ]
//! }
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use knowledge_center_core::models::DocumentChunk;

use crate::config::{required, ParserConfig};
use crate::traits::DocumentParser;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ParsedDocument {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub element_count: u64,
    #[serde(default)]
    pub data: Vec<ParsedElement>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ParsedElement {
    #[serde(default)]
    pub element_id: String,
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub vector: Vec<f32>,
}

impl ParsedElement {
    pub fn into_chunk(self) -> DocumentChunk {
        DocumentChunk {
            chunk_id: self.element_id,
            text: self.text,
            chunk_type: self.element_type,
            metadata: self.metadata,
            vector: self.vector,
        }
    }
}

pub struct HttpParser {
    client: reqwest::Client,
    url: String,
}

impl HttpParser {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build parser HTTP client")?;
        Ok(Self {
            client,
            url: required(&config.url, "PARSER_URL")?.to_string(),
        })
    }
}

#[async_trait]
impl DocumentParser for HttpParser {
    async fn parse(&self, filename: &str, content_type: &str, data: Bytes) -> Result<ParsedDocument> {
        let len = data.len() as u64;
        let part = Part::stream_with_length(data, len)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .context("invalid content type for parser upload")?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("failed to call parser service at {}", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("parser service error ({}): {}", status.as_u16(), body);
        }

        resp.json::<ParsedDocument>()
            .await
            .context("failed to decode parser response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response_and_chunk_mapping() {
        let parsed: ParsedDocument = serde_json::from_value(json!({
            "filename": "handbook.pdf",
            "content_type": "application/pdf",
            "element_count": 1,
            "data": [{
                "element_id": "p1_b0",
                "type": "table",
                "text": "Row 1",
                "metadata": { "source": "handbook.pdf", "page": 1 },
                "vector": [0.25, 0.5]
            }]
        }))
        .unwrap();
        assert_eq!(parsed.element_count, 1);

        let chunk = parsed.data[0].clone().into_chunk();
        assert_eq!(chunk.chunk_id, "p1_b0");
        assert_eq!(chunk.chunk_type, "table");
        assert_eq!(chunk.metadata["page"], json!(1));
        assert_eq!(chunk.vector, vec![0.25, 0.5]);
    }

    #[test]
    fn test_sparse_elements_default() {
        let parsed: ParsedDocument =
            serde_json::from_value(json!({ "data": [{ "text": "only text" }] })).unwrap();
        assert_eq!(parsed.element_count, 0);
        let chunk = parsed.data[0].clone().into_chunk();
        assert!(chunk.vector.is_empty());
        assert!(chunk.metadata.is_empty());
    }

    #[test]
    fn test_requires_url() {
        let err = HttpParser::new(&ParserConfig::default()).err().unwrap();
        assert!(err.to_string().contains("PARSER_URL"));
    }
}
