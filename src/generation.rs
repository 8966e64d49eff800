//! Answer generation through the Gemini `generateContent` REST API.
//!
//! ```text
//! POST {base_url}/models/{model}:generateContent?key=...
//! { "contents": [{ "parts": [{ "text": prompt }] }],
//!   "generationConfig": { "temperature": 0.2 } }
//! ```
//!
//! Without an API key the generator reports `Ok(None)` and chat falls back
//! to returning raw search results.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::traits::AnswerGenerator;

pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    temperature: f64,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build generation HTTP client")?;
        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("no generation API key configured, skipping generation");
            return Ok(None);
        };

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        debug!(model = %self.model, "requesting generated answer");
        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("generation request failed: {}", e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("generation service error {}: {}", status, text);
        }

        let json: Value = resp.json().await.context("generation response is not JSON")?;
        parse_generate_response(&json).map(Some)
    }
}

/// Concatenated text parts of the first candidate.
fn parse_generate_response(json: &Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            anyhow!("generation returned no answer: {}", reason)
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_key_means_no_generation() {
        let generator = GeminiGenerator::new(&GenerationConfig::default()).unwrap();
        assert_eq!(generator.generate("prompt").await.unwrap(), None);
    }

    #[test]
    fn test_endpoint() {
        let generator = GeminiGenerator::new(&GenerationConfig::default()).unwrap();
        assert_eq!(
            generator.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn test_parts_are_concatenated() {
        let text = parse_generate_response(&json!({
            "candidates": [
                { "content": { "parts": [{ "text": "Leave " }, { "text": "accrues monthly." }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(text, "Leave accrues monthly.");
    }

    #[test]
    fn test_empty_candidates_is_an_error() {
        let err = parse_generate_response(&json!({
            "candidates": [],
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_candidate_without_parts_is_empty_text() {
        let text = parse_generate_response(&json!({
            "candidates": [{ "finishReason": "MAX_TOKENS" }]
        }))
        .unwrap();
        assert!(text.is_empty());
    }
}
