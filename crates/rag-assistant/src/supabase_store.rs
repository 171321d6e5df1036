//! Hosted Postgres [`Store`] over Supabase's PostgREST API.
//!
//! Tables and the `search_chunks` similarity function are created by
//! `sql/supabase_schema.sql`. Every request carries the anon key twice:
//! as the `apikey` header and as a bearer token.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | insert document | `POST /rest/v1/documents` |
//! | insert chunks | `POST /rest/v1/document_chunks` (one array body) |
//! | search | `POST /rest/v1/rpc/search_chunks` |
//! | list documents | `GET /rest/v1/documents?order=uploaded_at.desc` |
//! | delete | `DELETE /rest/v1/documents?id=eq.<id>` (chunks cascade) |
//!
//! Ids are `uuid` columns, so an id that is not a UUID cannot match a row
//! and is answered locally as "not found".
//!
//! pgvector columns come back either as text (`"[0.1,0.2]"`) or as JSON
//! arrays depending on the PostgREST version; both are accepted.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use rag_assistant_core::models::{ChatMessage, ChunkMatch, Document, DocumentChunk};
use rag_assistant_core::store::{rank_matches, Store};

use crate::config::{env_value, SUPABASE_ANON_KEY_ENV, SUPABASE_URL_ENV};

pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseStore {
    pub fn new(base_url: &str, anon_key: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    /// Build from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    pub fn from_env(timeout_secs: u64) -> Result<Self> {
        match (env_value(SUPABASE_URL_ENV), env_value(SUPABASE_ANON_KEY_ENV)) {
            (Some(url), Some(key)) => Self::new(&url, &key, timeout_secs),
            _ => bail!(
                "{} and {} must be set to use the supabase store",
                SUPABASE_URL_ENV,
                SUPABASE_ANON_KEY_ENV
            ),
        }
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, path))
            .with_context(|| format!("Invalid Supabase URL: {}", self.base_url))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Supabase API error {}: {}", status, body);
        }
        Ok(response)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let url = self.url(table, query)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, body: &T) -> Result<()> {
        let url = self.url(table, &[])?;
        self.send(
            self.request(Method::POST, url)
                .header("Prefer", "return=minimal")
                .json(body),
        )
        .await?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentRow {
    id: String,
    filename: String,
    content: String,
    file_type: String,
    file_size: i64,
    uploaded_at: DateTime<Utc>,
}

impl From<&Document> for DocumentRow {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            content: doc.content.clone(),
            file_type: doc.file_type.clone(),
            file_size: doc.size as i64,
            uploaded_at: doc.uploaded_at,
        }
    }
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            filename: row.filename,
            content: row.content,
            file_type: row.file_type,
            size: row.file_size.max(0) as u64,
            uploaded_at: row.uploaded_at,
            chunks: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkRow {
    id: String,
    document_id: String,
    content: String,
    #[serde(default)]
    embedding: Option<serde_json::Value>,
    chunk_index: i64,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
    #[serde(default)]
    similarity: Option<f32>,
}

impl ChunkRow {
    fn into_chunk(self) -> DocumentChunk {
        DocumentChunk {
            id: self.id,
            document_id: self.document_id,
            content: self.content,
            embedding: self
                .embedding
                .as_ref()
                .and_then(parse_vector)
                .unwrap_or_default(),
            chunk_index: self.chunk_index.max(0) as usize,
            metadata: self.metadata.unwrap_or_else(|| serde_json::json!({})),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatRow {
    id: String,
    content: String,
    is_user: bool,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    sources: Option<Vec<DocumentChunk>>,
}

/// Decode a pgvector value returned as `"[0.1,0.2]"` text or a JSON array.
pub fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect(),
        serde_json::Value::String(text) => {
            let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
            if inner.trim().is_empty() {
                return Some(Vec::new());
            }
            inner
                .split(',')
                .map(|part| part.trim().parse::<f32>().ok())
                .collect()
        }
        _ => None,
    }
}

#[async_trait]
impl Store for SupabaseStore {
    fn backend(&self) -> &'static str {
        "supabase"
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        self.insert("documents", &DocumentRow::from(doc)).await
    }

    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let rows: Vec<serde_json::Value> = chunks
            .iter()
            .map(|c| {
                let embedding = (!c.embedding.is_empty()).then_some(&c.embedding);
                serde_json::json!({
                    "id": c.id,
                    "document_id": c.document_id,
                    "content": c.content,
                    "embedding": embedding,
                    "chunk_index": c.chunk_index,
                    "metadata": c.metadata,
                })
            })
            .collect();
        self.insert("document_chunks", &rows).await
    }

    async fn search_chunks(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>> {
        if limit == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.url("rpc/search_chunks", &[])?;
        let body = serde_json::json!({
            "query_embedding": query,
            "match_threshold": threshold,
            "match_count": limit,
        });
        let response = self
            .send(self.request(Method::POST, url).json(&body))
            .await?;
        let rows: Vec<ChunkRow> = response.json().await?;

        let matches = rows
            .into_iter()
            .filter_map(|row| {
                let similarity = row.similarity?;
                (similarity > threshold).then(|| ChunkMatch {
                    chunk: row.into_chunk(),
                    similarity,
                })
            })
            .collect();

        Ok(rank_matches(matches, limit))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        if Uuid::parse_str(id).is_err() {
            return Ok(None);
        }
        let rows: Vec<DocumentRow> = self
            .select(
                "documents",
                &[("select", "*".into()), ("id", format!("eq.{}", id))],
            )
            .await?;
        Ok(rows.into_iter().next().map(Document::from))
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let rows: Vec<ChunkRow> = self
            .select(
                "document_chunks",
                &[
                    ("select", "*".into()),
                    ("document_id", format!("eq.{}", document_id)),
                    ("order", "chunk_index.asc".into()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(ChunkRow::into_chunk).collect())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = self
            .select(
                "documents",
                &[("select", "*".into()), ("order", "uploaded_at.desc".into())],
            )
            .await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        if Uuid::parse_str(id).is_err() {
            return Ok(false);
        }
        let url = self.url("documents", &[("id", format!("eq.{}", id))])?;
        let response = self
            .send(
                self.request(Method::DELETE, url)
                    .header("Prefer", "return=representation"),
            )
            .await?;
        let deleted: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| anyhow!("Invalid delete response: {}", e))?;
        Ok(!deleted.is_empty())
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> Result<()> {
        let row = ChatRow {
            id: message.id.clone(),
            content: message.content.clone(),
            is_user: message.is_user,
            timestamp: message.timestamp,
            sources: message
                .sources
                .as_ref()
                .map(|s| s.iter().map(DocumentChunk::without_embedding).collect()),
        };
        self.insert("chat_messages", &row).await
    }

    async fn list_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows: Vec<ChatRow> = self
            .select(
                "chat_messages",
                &[
                    ("select", "*".into()),
                    ("order", "timestamp.desc".into()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let mut messages: Vec<ChatMessage> = rows
            .into_iter()
            .map(|row| ChatMessage {
                id: row.id,
                content: row.content,
                is_user: row.is_user,
                timestamp: row.timestamp,
                sources: row.sources,
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }
}
