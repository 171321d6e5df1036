//! In-memory [`Store`] implementation for tests and throwaway servers.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Vector search is brute-force
//! cosine similarity over all stored chunks.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{ChatMessage, ChunkMatch, Document, DocumentChunk};

use super::{rank_matches, Store};

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
    chunks: RwLock<Vec<DocumentChunk>>,
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        if docs.iter().any(|d| d.id == doc.id) {
            return Err(anyhow!("duplicate document id: {}", doc.id));
        }
        docs.push(Document {
            chunks: Vec::new(),
            ..doc.clone()
        });
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let docs = self.docs.read().map_err(poisoned)?;
        if let Some(orphan) = chunks
            .iter()
            .find(|c| !docs.iter().any(|d| d.id == c.document_id))
        {
            return Err(anyhow!("unknown document id: {}", orphan.document_id));
        }
        let mut stored = self.chunks.write().map_err(poisoned)?;
        stored.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn search_chunks(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let matches = chunks
            .iter()
            .filter_map(|chunk| {
                let similarity = cosine_similarity(query, &chunk.embedding).ok()?;
                (similarity > threshold).then(|| ChunkMatch {
                    chunk: chunk.clone(),
                    similarity,
                })
            })
            .collect();
        Ok(rank_matches(matches, limit))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut found: Vec<DocumentChunk> = chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.chunk_index);
        Ok(found)
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        // Stable sort keeps later inserts first among equal timestamps.
        let mut listed: Vec<Document> = docs.iter().rev().cloned().collect();
        listed.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(listed)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        let deleted = docs.len() != before;
        if deleted {
            let mut chunks = self.chunks.write().map_err(poisoned)?;
            chunks.retain(|c| c.document_id != id);
        }
        Ok(deleted)
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> Result<()> {
        let mut messages = self.messages.write().map_err(poisoned)?;
        messages.push(message.clone());
        Ok(())
    }

    async fn list_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.read().map_err(poisoned)?;
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}
