//! Question answering.
//!
//! Embed the question, find the closest chunks, then either generate a
//! grounded answer or fall back to the raw chunk text. Generation is a soft
//! dependency: when it is unavailable or fails, the caller still gets the
//! matching passages.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use knowledge_center_core::answer::{build_prompt, collect_sources, compose_response, NO_MATCHES_RESPONSE};
use knowledge_center_core::models::Source;
use knowledge_center_core::search::search_similar_chunks;

use crate::config::Config;
use crate::error::ApiError;
use crate::services::AppServices;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

pub async fn answer_question(services: &AppServices, question: &str) -> Result<ChatResponse, ApiError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let vector = services
        .embedder
        .embed(question)
        .await
        .map_err(|e| ApiError::upstream("embedder", e))?;

    let matches = search_similar_chunks(services.store.as_ref(), &vector, &services.search)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;

    if matches.is_empty() {
        debug!("no matching chunks");
        return Ok(ChatResponse {
            response: NO_MATCHES_RESPONSE.to_string(),
            sources: Vec::new(),
        });
    }

    let generated = match services.generator.generate(&build_prompt(&matches, question)).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "generation failed, returning raw matches");
            None
        }
    };

    Ok(ChatResponse {
        sources: collect_sources(&matches),
        response: compose_response(&matches, generated),
    })
}

/// CLI entry point: answers one question and prints it with its sources.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let services = AppServices::from_config(config)?;
    let answer = answer_question(&services, question).await?;

    println!("{}", answer.response);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            if source.page > 0 {
                println!("  - {} (page {})", source.filename, source.page);
            } else {
                println!("  - {}", source.filename);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{element, GeneratorMode, Harness};
    use knowledge_center_core::models::Document;
    use knowledge_center_core::repository::save_document;

    async fn seed(h: &Harness, texts: &[&str]) {
        let mut doc = Document::new("doc::seed", "a.pdf");
        doc.chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| element(&format!("c{}", i), t).into_chunk())
            .collect();
        save_document(h.store.as_ref(), &mut doc).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_matches_skips_generation() {
        let h = Harness::with_generator(GeneratorMode::Answer("should not appear".to_string()));
        let resp = answer_question(&h.services, "anything?").await.unwrap();
        assert_eq!(resp.response, NO_MATCHES_RESPONSE);
        assert!(resp.sources.is_empty());
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_generated_answer_wins() {
        let h = Harness::with_generator(GeneratorMode::Answer("Leave accrues monthly.".to_string()));
        seed(&h, &["Employees accrue leave monthly."]).await;

        let resp = answer_question(&h.services, "How does leave accrue?").await.unwrap();
        assert_eq!(resp.response, "Leave accrues monthly.");
        assert_eq!(
            resp.sources,
            vec![Source {
                filename: "a.pdf".to_string(),
                page: 1
            }]
        );
        let prompt = h.generator.last_prompt().unwrap();
        assert!(prompt.contains("**User Question:** How does leave accrue?"));
        assert!(prompt.contains("Employees accrue leave monthly."));
    }

    #[tokio::test]
    async fn test_unavailable_generation_falls_back_to_raw_text() {
        let h = Harness::with_generator(GeneratorMode::Unavailable);
        seed(&h, &["Employees accrue leave monthly."]).await;

        let resp = answer_question(&h.services, "leave?").await.unwrap();
        assert_eq!(
            resp.response,
            "Here is what I found in your documents:\n\nEmployees accrue leave monthly."
        );
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_generation_error_is_not_fatal() {
        let h = Harness::with_generator(GeneratorMode::Fail);
        seed(&h, &["Employees accrue leave monthly."]).await;

        let resp = answer_question(&h.services, "leave?").await.unwrap();
        assert!(resp.response.starts_with("Here is what I found"));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_upstream_error() {
        let h = Harness::with_failing_embedder();
        let err = answer_question(&h.services, "leave?").await.unwrap_err();
        assert_eq!(err.code(), "upstream_error");
        assert!(err.to_string().starts_with("embedder:"));
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let h = Harness::with_generator(GeneratorMode::Unavailable);
        let err = answer_question(&h.services, "   ").await.unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn test_sources_omitted_when_empty() {
        let resp = ChatResponse {
            response: "x".to_string(),
            sources: Vec::new(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("sources").is_none());
    }
}
