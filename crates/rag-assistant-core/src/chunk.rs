//! Sentence-boundary text chunker with word overlap.
//!
//! Splits document text into bounded-size pieces for embedding. This is a
//! size heuristic, not a tokenizer: lengths are counted in characters and
//! sentence boundaries are runs of `.`, `!`, or `?`.
//!
//! # Algorithm
//!
//! 1. Split the text on runs of sentence-terminal punctuation and drop
//!    blank sentences.
//! 2. Append sentences (each followed by `". "`) to a buffer.
//! 3. When the next sentence would push the buffer past `chunk_size`,
//!    flush the buffer as a chunk and seed the next buffer with the last
//!    `overlap / 10` words of the flushed one.
//! 4. Flush whatever remains.
//!
//! Text without terminal punctuation becomes a single chunk regardless of
//! its length. Blank text produces no chunks.
//!
//! # Example
//!
//! ```rust
//! use rag_assistant_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world. Second sentence!", 1000, 200);
//! assert_eq!(chunks, vec!["Hello world. Second sentence."]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::DocumentChunk;

/// Default target chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap budget in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// Rough characters-per-word ratio used to turn the overlap budget into a
/// word count.
const CHARS_PER_WORD: usize = 10;

const SENTENCE_END: &str = ". ";

/// Split text into trimmed, non-blank sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split text into chunks of roughly `chunk_size` characters.
///
/// Consecutive chunks share up to `overlap / 10` words: the leading words of
/// a chunk repeat the trailing words of the one before it.
///
/// # Guarantees
///
/// - Every non-blank sentence appears verbatim in at least one chunk.
/// - A chunk only exceeds `chunk_size` by the overlap it was seeded with
///   plus one sentence.
/// - Chunks are trimmed and never empty.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let overlap_words = overlap / CHARS_PER_WORD;
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_size = 0usize;

    for sentence in split_sentences(text) {
        let sentence_size = sentence.chars().count();

        if current_size + sentence_size > chunk_size && !current.trim().is_empty() {
            chunks.push(current.trim().to_string());

            let tail = trailing_words(&current, overlap_words);
            current.clear();
            if !tail.is_empty() {
                current.push_str(&tail);
                current.push(' ');
            }
            current_size = current.chars().count();
        }

        current.push_str(sentence);
        current.push_str(SENTENCE_END);
        current_size += sentence_size + SENTENCE_END.len();
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

/// Last `count` whitespace-separated words of `text`, joined by single spaces.
fn trailing_words(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}

/// Turn chunk texts into [`DocumentChunk`]s for a document.
///
/// Indices are contiguous from 0. `embeddings[i]` is attached to piece `i`;
/// a missing embedding leaves the vector empty. Metadata records the chunk
/// length, the source filename, and a SHA-256 of the text.
pub fn build_chunks(
    document_id: &str,
    filename: &str,
    pieces: &[String],
    embeddings: &[Vec<f32>],
) -> Vec<DocumentChunk> {
    pieces
        .iter()
        .enumerate()
        .map(|(index, text)| {
            let embedding = embeddings.get(index).cloned().unwrap_or_default();
            make_chunk(document_id, filename, index, text, embedding)
        })
        .collect()
}

fn make_chunk(
    document_id: &str,
    filename: &str,
    index: usize,
    text: &str,
    embedding: Vec<f32>,
) -> DocumentChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        content: text.to_string(),
        embedding,
        chunk_index: index,
        metadata: serde_json::json!({
            "length": text.chars().count(),
            "filename": filename,
            "hash": hash,
        }),
    }
}
