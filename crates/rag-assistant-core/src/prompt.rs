//! Prompt assembly and the templated fallback answer.
//!
//! [`build_rag_prompt`] is what gets sent to a real LLM; [`mock_response`]
//! stands in when no LLM is configured or the call fails.

use crate::models::DocumentChunk;

/// Characters of retrieved text echoed by [`mock_response`].
pub const MOCK_SUMMARY_CHARS: usize = 300;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Render retrieved chunks as `Source: <filename>\n<content>` blocks.
pub fn format_context(chunks: &[DocumentChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "Source: {}\n{}",
                chunk.filename().unwrap_or("Document"),
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Build the generation prompt from retrieved context and the question.
pub fn build_rag_prompt(query: &str, chunks: &[DocumentChunk]) -> String {
    format!(
        "Based on the following context from uploaded documents, please provide a \
         comprehensive and accurate answer to the user's question. If the context doesn't \
         contain relevant information, please state that clearly.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Please provide a helpful response based on the available context:",
        format_context(chunks),
        query
    )
}

/// Templated answer that echoes the start of the retrieved text.
pub fn mock_response(query: &str, chunks: &[DocumentChunk]) -> String {
    if chunks.is_empty() {
        return format!(
            "I don't have any relevant information in the uploaded documents to answer your \
             question about \"{}\". Please upload some documents first or try a different question.",
            query
        );
    }

    let context = chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut summary: String = context.chars().take(MOCK_SUMMARY_CHARS).collect();
    if context.chars().count() > MOCK_SUMMARY_CHARS {
        summary.push_str("...");
    }

    let plural = if chunks.len() > 1 { "s" } else { "" };

    format!(
        "Based on the uploaded documents, here's what I found regarding \"{}\":\n\n{}\n\n\
         This information comes from {} relevant section{} in your uploaded documents. \
         For more detailed information, you might want to ask more specific questions \
         about particular aspects.",
        query,
        summary,
        chunks.len(),
        plural
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, filename: Option<&str>) -> DocumentChunk {
        DocumentChunk {
            id: "c".into(),
            document_id: "d".into(),
            content: content.into(),
            embedding: Vec::new(),
            chunk_index: 0,
            metadata: match filename {
                Some(f) => serde_json::json!({ "filename": f }),
                None => serde_json::json!({}),
            },
        }
    }

    #[test]
    fn test_prompt_contains_sources_and_question() {
        let chunks = vec![
            chunk("Rust has no GC.", Some("rust.md")),
            chunk("Cargo builds crates.", None),
        ];
        let prompt = build_rag_prompt("How does Rust manage memory?", &chunks);
        assert!(prompt.contains("Source: rust.md\nRust has no GC."));
        assert!(prompt.contains("Source: Document\nCargo builds crates."));
        assert!(prompt.contains("Rust has no GC.\n\n---\n\nSource: Document"));
        assert!(prompt.contains("Question: How does Rust manage memory?"));
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_rag_prompt("What is Cargo?", &[chunk("Cargo builds crates.", None)]);
        assert!(prompt.starts_with(
            "Based on the following context from uploaded documents, please provide a \
             comprehensive and accurate answer to the user's question. If the context \
             doesn't contain relevant information, please state that clearly.\n\nContext:\n"
        ));
        assert!(prompt.ends_with(
            "Question: What is Cargo?\n\n\
             Please provide a helpful response based on the available context:"
        ));
    }

    #[test]
    fn test_mock_response_without_context() {
        let reply = mock_response("pricing", &[]);
        assert!(reply.starts_with("I don't have any relevant information"));
        assert!(reply.contains("\"pricing\""));
    }

    #[test]
    fn test_mock_response_single_section() {
        let reply = mock_response("cargo", &[chunk("Cargo builds crates.", None)]);
        assert!(reply.contains("regarding \"cargo\":\n\nCargo builds crates.\n\n"));
        assert!(reply.contains("from 1 relevant section in"));
        assert!(!reply.contains("..."));
    }

    #[test]
    fn test_mock_response_truncates_and_pluralises() {
        let long = "x".repeat(400);
        let reply = mock_response("q", &[chunk(&long, None), chunk("zebra", None)]);
        let expected = format!("{}...", "x".repeat(MOCK_SUMMARY_CHARS));
        assert!(reply.contains(&expected));
        assert!(!reply.contains("zebra"));
        assert!(reply.contains("from 2 relevant sections in"));
    }
}
