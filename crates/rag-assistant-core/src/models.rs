//! Core data models used throughout RAG Assistant.
//!
//! These are plain records passed to and from the store. No cross-entity
//! consistency is enforced here; chunk → document integrity belongs to the
//! storage backend (foreign keys with cascading delete).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded document.
///
/// `chunks` is empty unless the caller explicitly loaded them
/// (see [`Store::get_chunks`](crate::store::Store::get_chunks)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub content: String,
    pub file_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub chunks: Vec<DocumentChunk>,
}

/// A bounded slice of a document's text plus its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub chunk_index: usize,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DocumentChunk {
    /// Copy of the chunk with the embedding dropped, for API responses.
    pub fn without_embedding(&self) -> Self {
        Self {
            embedding: Vec::new(),
            ..self.clone()
        }
    }

    /// Filename recorded in the chunk metadata, if any.
    pub fn filename(&self) -> Option<&str> {
        self.metadata.get("filename").and_then(|v| v.as_str())
    }
}

/// One entry in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<DocumentChunk>>,
}

/// A chunk returned by similarity search, before document enrichment.
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub chunk: DocumentChunk,
    pub similarity: f32,
}

/// A retrieved chunk paired with its score and parent document.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub similarity: f32,
    pub document: Document,
}

/// Human-readable byte size with a 1024 base: `"0 Bytes"`, `"1.5 KB"`, `"10 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exp = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && exp < UNITS.len() - 1 {
        value /= 1024.0;
        exp += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    let mut text = format!("{:.2}", rounded);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{} {}", text, UNITS[exp])
}
