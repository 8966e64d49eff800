//! Answer composition for chat responses.
//!
//! Pure helpers shared by the chat handler and the CLI: the generation
//! prompt, source de-duplication, and the fallback text used whenever a
//! generated answer is unavailable.

use std::collections::HashSet;

use crate::models::{ChunkMatch, Source};

/// Reply when the search found nothing.
pub const NO_MATCHES_RESPONSE: &str = "I couldn't find any relevant information in your documents.";

/// Heading placed before raw chunk text in the fallback reply.
pub const RAW_MATCHES_HEADER: &str = "Here is what I found in your documents:\n\n";

/// Separator between raw chunks in the fallback reply.
pub const RAW_MATCHES_SEPARATOR: &str = "\n\n---\n\n";

const PROMPT_PREAMBLE: &str = "You are a high-level technical assistant for the BPT Knowledge Center.
Your goal is to provide a comprehensive, clear, and professional answer based **ONLY** on the context provided below.

### Formatting Guidelines:
1. **Direct Summary**: Start with a 1-2 sentence high-level summary of the answer.
2. **Structured Details**: Use bullet points or numbered lists for technical features, steps, or list items.
3. **Emphasis**: Use **bold** text for key terms, categories, or important entities.
4. **Tone**: Maintain a professional, objective, and helpful tone.
5. **Constraints**:
   - If the information is not in the context, explicitly state: \"I couldn't find that specific information in the available documents.\"
   - Do not mention the context sources (e.g., \"Source 1 says...\") directly in the narrative unless necessary for clarity.
   - Use standard Markdown formatting for best readability in a web interface.
";

/// Numbered context block, one entry per match.
///
/// ```text
/// Source 1 (from handbook.pdf, Page 3):
/// <chunk text>
/// ```
pub fn context_block(matches: &[ChunkMatch]) -> String {
    let mut block = String::new();
    for (i, m) in matches.iter().enumerate() {
        let mut origin = String::new();
        if !m.source.is_empty() {
            origin = format!(" (from {}", m.source);
            if m.page > 0 {
                origin.push_str(&format!(", Page {}", m.page));
            }
            origin.push(')');
        }
        block.push_str(&format!("Source {}{}:\n{}\n\n", i + 1, origin, m.text));
    }
    block
}

/// Full prompt sent to the generation service.
pub fn build_prompt(matches: &[ChunkMatch], question: &str) -> String {
    format!(
        "{}\n---\n**Context Documents:**\n{}\n---\n**User Question:** {}\n\n**Structured Answer:**",
        PROMPT_PREAMBLE,
        context_block(matches),
        question
    )
}

/// Distinct cited sources in first-seen order. Matches without a source
/// are skipped.
pub fn collect_sources(matches: &[ChunkMatch]) -> Vec<Source> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for m in matches {
        if m.source.is_empty() {
            continue;
        }
        let source = Source {
            filename: m.source.clone(),
            page: m.page,
        };
        if seen.insert(source.clone()) {
            sources.push(source);
        }
    }
    sources
}

/// Reply built from the raw matches, used when no generated answer exists.
pub fn fallback_response(matches: &[ChunkMatch]) -> String {
    if matches.is_empty() {
        return NO_MATCHES_RESPONSE.to_string();
    }
    let texts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
    format!("{}{}", RAW_MATCHES_HEADER, texts.join(RAW_MATCHES_SEPARATOR))
}

/// Pick the final reply: a non-empty generated answer, else the fallback.
pub fn compose_response(matches: &[ChunkMatch], generated: Option<String>) -> String {
    match generated {
        Some(answer) if !answer.trim().is_empty() => answer,
        _ => fallback_response(matches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(text: &str, source: &str, page: u32) -> ChunkMatch {
        ChunkMatch {
            text: text.to_string(),
            source: source.to_string(),
            page,
        }
    }

    #[test]
    fn test_context_block_formats_origin() {
        let block = context_block(&[m("alpha", "a.pdf", 3), m("beta", "b.pdf", 0), m("gamma", "", 2)]);
        assert!(block.contains("Source 1 (from a.pdf, Page 3):\nalpha\n\n"));
        assert!(block.contains("Source 2 (from b.pdf):\nbeta\n\n"));
        assert!(block.contains("Source 3:\ngamma\n\n"));
    }

    #[test]
    fn test_prompt_contains_question_and_context() {
        let prompt = build_prompt(&[m("alpha", "a.pdf", 1)], "What is alpha?");
        assert!(prompt.contains("**User Question:** What is alpha?"));
        assert!(prompt.contains("Source 1 (from a.pdf, Page 1):"));
        assert!(prompt.ends_with("**Structured Answer:**"));
    }

    #[test]
    fn test_collect_sources_dedups_in_order() {
        let sources = collect_sources(&[
            m("1", "b.pdf", 2),
            m("2", "a.pdf", 1),
            m("3", "b.pdf", 2),
            m("4", "b.pdf", 5),
            m("5", "", 1),
        ]);
        assert_eq!(
            sources,
            vec![
                Source { filename: "b.pdf".to_string(), page: 2 },
                Source { filename: "a.pdf".to_string(), page: 1 },
                Source { filename: "b.pdf".to_string(), page: 5 },
            ]
        );
    }

    #[test]
    fn test_fallback_without_matches() {
        assert_eq!(fallback_response(&[]), NO_MATCHES_RESPONSE);
    }

    #[test]
    fn test_fallback_joins_raw_text() {
        let reply = fallback_response(&[m("one", "a", 0), m("two", "b", 0)]);
        assert_eq!(
            reply,
            "Here is what I found in your documents:\n\none\n\n---\n\ntwo"
        );
    }

    #[test]
    fn test_compose_prefers_generated_answer() {
        let matches = [m("one", "a", 0)];
        assert_eq!(compose_response(&matches, Some("Answer".to_string())), "Answer");
        assert_eq!(
            compose_response(&matches, Some("  ".to_string())),
            fallback_response(&matches)
        );
        assert_eq!(compose_response(&matches, None), fallback_response(&matches));
    }
}
