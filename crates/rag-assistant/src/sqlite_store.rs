//! SQLite-backed [`Store`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs beside each chunk and
//! searched brute-force: every stored vector is scored against the query
//! with cosine similarity. Timestamps are stored as Unix milliseconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use rag_assistant_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use rag_assistant_core::models::{ChatMessage, ChunkMatch, Document, DocumentChunk};
use rag_assistant_core::store::{rank_matches, Store};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn ts_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn document_from_row(row: &SqliteRow) -> Document {
    let size: i64 = row.get("file_size");
    Document {
        id: row.get("id"),
        filename: row.get("filename"),
        content: row.get("content"),
        file_type: row.get("file_type"),
        size: size.max(0) as u64,
        uploaded_at: ts_from_millis(row.get("uploaded_at")),
        chunks: Vec::new(),
    }
}

fn chunk_from_row(row: &SqliteRow) -> DocumentChunk {
    let blob: Option<Vec<u8>> = row.get("embedding");
    let metadata_json: String = row.get("metadata_json");
    let index: i64 = row.get("chunk_index");
    DocumentChunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        content: row.get("content"),
        embedding: blob.as_deref().map(blob_to_vec).unwrap_or_default(),
        chunk_index: index.max(0) as usize,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, content, file_type, file_size, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.content)
        .bind(&doc.file_type)
        .bind(doc.size as i64)
        .bind(doc.uploaded_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting document {}", doc.id))?;
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            let blob = if chunk.embedding.is_empty() {
                None
            } else {
                Some(vec_to_blob(&chunk.embedding))
            };
            sqlx::query(
                r#"
                INSERT INTO document_chunks
                    (id, document_id, content, embedding, chunk_index, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.content)
            .bind(blob)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.metadata.to_string())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("inserting chunk {}", chunk.id))?;
        }

        tx.commit().await?;
        Ok(())
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

        let rows = sqlx::query(
            r#"
            SELECT id, document_id, content, embedding, chunk_index, metadata_json
            FROM document_chunks
            WHERE embedding IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let matches = rows
            .iter()
            .filter_map(|row| {
                let chunk = chunk_from_row(row);
                let similarity = cosine_similarity(query, &chunk.embedding).ok()?;
                (similarity > threshold).then_some(ChunkMatch { chunk, similarity })
            })
            .collect();

        Ok(rank_matches(matches, limit))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, filename, content, file_type, file_size, uploaded_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(document_from_row))
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, content, embedding, chunk_index, metadata_json
            FROM document_chunks
            WHERE document_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, content, file_type, file_size, uploaded_at
            FROM documents
            ORDER BY uploaded_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> Result<()> {
        let sources_json = match &message.sources {
            Some(sources) => {
                let stripped: Vec<DocumentChunk> =
                    sources.iter().map(DocumentChunk::without_embedding).collect();
                Some(serde_json::to_string(&stripped)?)
            }
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, content, is_user, timestamp, sources_json)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.content)
        .bind(message.is_user)
        .bind(message.timestamp.timestamp_millis())
        .bind(sources_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, content, is_user, timestamp, sources_json
            FROM chat_messages
            ORDER BY timestamp DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<ChatMessage> = rows
            .iter()
            .map(|row| {
                let sources_json: Option<String> = row.get("sources_json");
                ChatMessage {
                    id: row.get("id"),
                    content: row.get("content"),
                    is_user: row.get("is_user"),
                    timestamp: ts_from_millis(row.get("timestamp")),
                    sources: sources_json.and_then(|s| serde_json::from_str(&s).ok()),
                }
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use chrono::Duration;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> SqliteStore {
        let mut config = Config::default();
        config.store.path = tmp.path().join("data").join("rag.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn doc(id: &str, offset_secs: i64) -> Document {
        Document {
            id: id.into(),
            filename: format!("{}.txt", id),
            content: "body".into(),
            file_type: "txt".into(),
            size: 4,
            uploaded_at: Utc::now() + Duration::seconds(offset_secs),
            chunks: Vec::new(),
        }
    }

    fn chunk(id: &str, doc_id: &str, index: usize, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: id.into(),
            document_id: doc_id.into(),
            content: format!("content of {}", id),
            embedding,
            chunk_index: index,
            metadata: serde_json::json!({ "filename": format!("{}.txt", doc_id) }),
        }
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let d = doc("d1", 0);
        store.insert_document(&d).await.unwrap();

        let loaded = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(loaded.filename, "d1.txt");
        assert_eq!(loaded.size, 4);
        assert_eq!(
            loaded.uploaded_at.timestamp_millis(),
            d.uploaded_at.timestamp_millis()
        );
        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_document_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.insert_document(&doc("d1", 0)).await.unwrap();
        assert!(store.insert_document(&doc("d1", 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_orphan_chunk_rejected_by_foreign_key() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let err = store
            .insert_chunks(&[chunk("c1", "nope", 0, vec![1.0, 0.0])])
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_search_threshold_limit_and_order() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.insert_document(&doc("d1", 0)).await.unwrap();
        store
            .insert_chunks(&[
                chunk("exact", "d1", 0, vec![1.0, 0.0]),
                chunk("close", "d1", 1, vec![0.9, 0.1]),
                chunk("far", "d1", 2, vec![0.0, 1.0]),
                chunk("wrong_dims", "d1", 3, vec![1.0, 0.0, 0.0]),
                chunk("no_vector", "d1", 4, Vec::new()),
            ])
            .await
            .unwrap();

        let results = store.search_chunks(&[1.0, 0.0], 0.5, 10).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|m| m.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "close"]);
        assert!(results[0].similarity >= results[1].similarity);
        assert_eq!(results[0].chunk.embedding, vec![1.0, 0.0]);

        let top = store.search_chunks(&[1.0, 0.0], 0.5, 1).await.unwrap();
        assert_eq!(top.len(), 1);

        let none = store.search_chunks(&[1.0, 0.0], 1.0, 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_chunks_ordered_and_metadata_kept() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.insert_document(&doc("d1", 0)).await.unwrap();
        store
            .insert_chunks(&[chunk("b", "d1", 1, vec![]), chunk("a", "d1", 0, vec![])])
            .await
            .unwrap();
        let chunks = store.get_chunks("d1").await.unwrap();
        assert_eq!(chunks[0].id, "a");
        assert_eq!(chunks[1].id, "b");
        assert_eq!(chunks[0].filename(), Some("d1.txt"));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_chunks() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.insert_document(&doc("d1", 0)).await.unwrap();
        store
            .insert_chunks(&[chunk("c1", "d1", 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        assert!(store.delete_document("d1").await.unwrap());
        assert!(!store.delete_document("d1").await.unwrap());
        assert!(store.get_chunks("d1").await.unwrap().is_empty());
        assert!(store
            .search_chunks(&[1.0, 0.0], 0.0, 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.insert_document(&doc("old", -60)).await.unwrap();
        store.insert_document(&doc("new", 0)).await.unwrap();
        let ids: Vec<String> = store
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_chat_messages_latest_oldest_first() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let base = Utc::now();
        for i in 0..4 {
            let message = ChatMessage {
                id: format!("m{}", i),
                content: format!("message {}", i),
                is_user: i % 2 == 0,
                timestamp: base + Duration::seconds(i),
                sources: (i == 3).then(|| vec![chunk("s", "d1", 0, vec![0.5, 0.5])]),
            };
            store.save_chat_message(&message).await.unwrap();
        }

        let messages = store.list_chat_messages(2).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m2");
        assert_eq!(messages[1].id, "m3");
        assert!(messages[0].is_user);
        let sources = messages[1].sources.as_ref().unwrap();
        assert_eq!(sources[0].id, "s");
        assert!(sources[0].embedding.is_empty());
    }
}
