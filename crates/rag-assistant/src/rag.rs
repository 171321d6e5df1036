//! Retrieval-augmented answering over uploaded documents.
//!
//! [`RagService`] owns the pipeline:
//!
//! ```text
//! upload:  validate → extract text → chunk → embed → store
//! answer:  embed query → similarity search → attach documents → generate
//! ```
//!
//! Embedding and generation never fail (they fall back to mocks), so the
//! only errors surfaced here come from validation, extraction, and the
//! store. Store failures are reported with fixed user-facing messages; the
//! underlying cause is logged.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use rag_assistant_core::chunk::{build_chunks, chunk_text};
use rag_assistant_core::embedding::EmbeddingProvider;
use rag_assistant_core::models::{ChatMessage, Document, DocumentChunk, SearchResult};
use rag_assistant_core::session::ChatSession;
use rag_assistant_core::store::memory::InMemoryStore;
use rag_assistant_core::store::Store;
use rag_assistant_core::validate::{file_type_of, validate_file, UploadLimits, ValidationError};

use crate::config::{missing_api_keys, Config};
use crate::embedding::Embedder;
use crate::extract::{extract_text, ExtractError};
use crate::llm::Responder;
use crate::sqlite_store::SqliteStore;
use crate::supabase_store::SupabaseStore;
use crate::{db, migrate};

pub const STORE_FAILED: &str = "Failed to store document in vector database";
pub const SEARCH_FAILED: &str = "Failed to search vector database";
pub const FETCH_FAILED: &str = "Failed to fetch documents";
pub const DELETE_FAILED: &str = "Failed to delete document";

/// Timeout for requests to a hosted store.
const STORE_TIMEOUT_SECS: u64 = 30;

/// Why an upload was rejected.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("Could not read {filename}: {source}")]
    Extract {
        filename: String,
        #[source]
        source: ExtractError,
    },
    #[error("No extractable text in {0}")]
    Empty(String),
    #[error("{}", STORE_FAILED)]
    Store(anyhow::Error),
}

/// A successfully stored upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub document_id: String,
    pub filename: String,
    pub size: u64,
    pub chunks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Success,
    Error,
}

/// Per-file result of a multi-file upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadStatus {
    pub filename: String,
    pub status: UploadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A generated answer and the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub content: String,
    pub sources: Vec<DocumentChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub store: String,
    pub documents: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub llm_provider: String,
    pub llm_model: String,
    pub missing_keys: Vec<String>,
}

/// Open the store selected by `[store].backend`, creating the SQLite
/// schema when needed.
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.store.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "supabase" => Arc::new(SupabaseStore::from_env(STORE_TIMEOUT_SECS)?),
        _ => {
            let pool = db::connect(config).await?;
            migrate::apply(&pool).await?;
            Arc::new(SqliteStore::new(pool))
        }
    };
    Ok(store)
}

pub struct RagService {
    store: Arc<dyn Store>,
    embedder: Embedder,
    responder: Responder,
    config: Config,
    limits: UploadLimits,
}

impl RagService {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Embedder,
        responder: Responder,
        config: Config,
    ) -> Self {
        let limits = config.upload.limits();
        Self {
            store,
            embedder,
            responder,
            config,
            limits,
        }
    }

    /// Build the store and providers described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = open_store(config).await?;
        let embedder = Embedder::from_config(&config.embedding)?;
        let responder = Responder::from_config(&config.llm)?;
        Ok(Self::new(store, embedder, responder, config.clone()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Insert a document and its embedded chunks; returns the document id.
    ///
    /// A chunk insert failure leaves the document row in place.
    pub async fn store_document(
        &self,
        filename: &str,
        content: &str,
        file_type: &str,
        size: u64,
        pieces: &[String],
    ) -> Result<String> {
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content: content.to_string(),
            file_type: file_type.to_string(),
            size,
            uploaded_at: Utc::now(),
            chunks: Vec::new(),
        };

        self.store.insert_document(&doc).await.context(STORE_FAILED)?;

        let embeddings = self.embedder.embed_texts(pieces).await;
        let chunks = build_chunks(&doc.id, filename, pieces, &embeddings);

        self.store
            .insert_chunks(&chunks)
            .await
            .context(STORE_FAILED)?;

        Ok(doc.id)
    }

    /// Validate, extract, chunk, embed, and store one file.
    pub async fn upload_file(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome, UploadError> {
        let size = bytes.len() as u64;
        validate_file(filename, size, &self.limits)?;

        let text = extract_text(filename, bytes).map_err(|source| UploadError::Extract {
            filename: filename.to_string(),
            source,
        })?;

        let pieces = chunk_text(
            &text,
            self.config.chunking.chunk_size,
            self.config.chunking.overlap,
        );
        if pieces.is_empty() {
            return Err(UploadError::Empty(filename.to_string()));
        }

        let document_id = self
            .store_document(filename, &text, &file_type_of(filename), size, &pieces)
            .await
            .map_err(|e| {
                error!(filename, error = ?e, "Upload failed");
                UploadError::Store(e)
            })?;

        info!(filename, document_id = %document_id, chunks = pieces.len(), "Stored document");

        Ok(UploadOutcome {
            document_id,
            filename: filename.to_string(),
            size,
            chunks: pieces.len(),
        })
    }

    /// Upload each file independently; one failure does not stop the rest.
    pub async fn upload_files(&self, files: &[(String, Vec<u8>)]) -> Vec<UploadStatus> {
        let mut statuses = Vec::with_capacity(files.len());
        for (filename, bytes) in files {
            let status = match self.upload_file(filename, bytes).await {
                Ok(outcome) => UploadStatus {
                    filename: filename.clone(),
                    status: UploadState::Success,
                    document_id: Some(outcome.document_id),
                    chunks: Some(outcome.chunks),
                    error: None,
                },
                Err(e) => UploadStatus {
                    filename: filename.clone(),
                    status: UploadState::Error,
                    document_id: None,
                    chunks: None,
                    error: Some(e.to_string()),
                },
            };
            statuses.push(status);
        }
        statuses
    }

    /// Chunks similar to `query`, each with its parent document. Chunks
    /// whose document no longer exists are dropped.
    pub async fn search_similar(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        self.search_inner(query, limit, threshold)
            .await
            .map_err(|e| {
                error!(error = ?e, "Search failed");
                e.context(SEARCH_FAILED)
            })
    }

    async fn search_inner(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let query_vec = self.embedder.embed_query(query).await;
        let matches = self.store.search_chunks(&query_vec, threshold, limit).await?;

        let mut documents: HashMap<String, Option<Document>> = HashMap::new();
        let mut results = Vec::with_capacity(matches.len());

        for m in matches {
            let document_id = m.chunk.document_id.clone();
            if !documents.contains_key(&document_id) {
                let doc = self.store.get_document(&document_id).await?;
                documents.insert(document_id.clone(), doc);
            }
            if let Some(Some(document)) = documents.get(&document_id) {
                results.push(SearchResult {
                    chunk: m.chunk.without_embedding(),
                    similarity: m.similarity,
                    document: document.clone(),
                });
            }
        }

        Ok(results)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.store.list_documents().await.context(FETCH_FAILED)
    }

    /// A document with its chunks (embeddings omitted).
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let Some(mut doc) = self.store.get_document(id).await.context(FETCH_FAILED)? else {
            return Ok(None);
        };
        doc.chunks = self
            .store
            .get_chunks(id)
            .await
            .context(FETCH_FAILED)?
            .iter()
            .map(DocumentChunk::without_embedding)
            .collect();
        Ok(Some(doc))
    }

    /// Returns `false` when no document had this id.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_document(id).await.context(DELETE_FAILED)?;
        if deleted {
            info!(document_id = id, "Deleted document");
        }
        Ok(deleted)
    }

    /// Answer a question from the configured number of best chunks.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let retrieval = &self.config.retrieval;
        let results = self
            .search_similar(query, retrieval.limit, retrieval.threshold)
            .await?;
        let sources: Vec<DocumentChunk> = results.into_iter().map(|r| r.chunk).collect();
        let content = self.responder.generate_response(query, &sources).await;
        Ok(Answer { content, sources })
    }

    /// Add the user's message to `session` and answer it.
    ///
    /// Blank input is ignored (`Ok(None)`). When answering fails the
    /// session gets the apology message and the error is returned.
    pub async fn chat(&self, session: &mut ChatSession, input: &str) -> Result<Option<ChatMessage>> {
        let Some(user) = session.push_user(input).cloned() else {
            return Ok(None);
        };
        self.persist(&user).await;

        match self.answer(&user.content).await {
            Ok(answer) => {
                let reply = session.push_assistant(&answer.content, answer.sources).clone();
                self.persist(&reply).await;
                Ok(Some(reply))
            }
            Err(e) => {
                let apology = session.push_error().clone();
                self.persist(&apology).await;
                Err(e)
            }
        }
    }

    async fn persist(&self, message: &ChatMessage) {
        if !self.config.chat.persist {
            return;
        }
        if let Err(e) = self.store.save_chat_message(message).await {
            warn!(message_id = %message.id, error = %e, "Failed to save chat message");
        }
    }

    /// Persisted chat messages, oldest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        self.store
            .list_chat_messages(limit)
            .await
            .context("Failed to fetch chat history")
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let documents = self.list_documents().await?.len();
        Ok(ServiceStatus {
            store: self.store.backend().to_string(),
            documents,
            embedding_provider: self.embedder.provider_name().to_string(),
            embedding_model: self.embedder.model_name().to_string(),
            embedding_dims: self.embedder.dims(),
            llm_provider: self.responder.provider_name().to_string(),
            llm_model: self.responder.model().to_string(),
            missing_keys: missing_api_keys(&self.config)
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }
}
