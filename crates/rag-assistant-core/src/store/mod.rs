//! Storage abstraction for RAG Assistant.
//!
//! The [`Store`] trait covers everything the service layer needs from a
//! vector database: document and chunk writes, nearest-neighbour search,
//! listing, cascading delete, and chat message persistence. Backends:
//! in-memory ([`memory::InMemoryStore`]), SQLite and hosted Postgres
//! (both in the app crate).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChatMessage, ChunkMatch, Document, DocumentChunk};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](Store::insert_document) | Insert a document row (chunks are ignored) |
/// | [`insert_chunks`](Store::insert_chunks) | Insert chunks with their embeddings |
/// | [`search_chunks`](Store::search_chunks) | Cosine similarity search above a threshold |
/// | [`get_document`](Store::get_document) | Fetch one document without chunks |
/// | [`get_chunks`](Store::get_chunks) | Chunks of a document, ordered by index |
/// | [`list_documents`](Store::list_documents) | All documents, newest first |
/// | [`delete_document`](Store::delete_document) | Delete a document and its chunks |
/// | [`save_chat_message`](Store::save_chat_message) | Persist a chat message |
/// | [`list_chat_messages`](Store::list_chat_messages) | Most recent messages, oldest first |
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for status output (e.g. `"sqlite"`).
    fn backend(&self) -> &'static str;

    async fn insert_document(&self, doc: &Document) -> Result<()>;

    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Chunks whose cosine similarity to `query` is strictly greater than
    /// `threshold`, best first, at most `limit`.
    async fn search_chunks(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Returns `false` when no document had this id.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    async fn save_chat_message(&self, message: &ChatMessage) -> Result<()>;

    async fn list_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>>;
}

/// Sort matches best-first and keep at most `limit`.
pub fn rank_matches(mut matches: Vec<ChunkMatch>, limit: usize) -> Vec<ChunkMatch> {
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit);
    matches
}
