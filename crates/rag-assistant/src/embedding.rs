//! Embedding providers.
//!
//! [`Embedder`] turns text into vectors using the configured provider:
//!
//! - **jina**: `POST https://api.jina.ai/v1/embeddings` with
//!   `{ model, input, encoding_format: "float" }`, key from `JINA_API_KEY`.
//! - **openai**: `POST https://api.openai.com/v1/embeddings` with
//!   `{ model, input }`, key from `OPENAI_API_KEY`.
//! - **mock**: [`mock_embedding`] only, no network.
//!
//! Both remote providers answer with `data[].embedding`, parsed by
//! [`parse_embeddings_response`].
//!
//! # Fallback
//!
//! Embedding never fails. Without an API key every call uses the mock
//! embedding (logged once at construction). When a remote call fails for
//! any reason (HTTP status, network, malformed body, wrong count or
//! dimensionality) the error is logged and the whole call falls back to
//! mock vectors.
//!
//! # Retry
//!
//! Requests are batched by `batch_size`. Each batch is retried up to
//! `max_retries` times with exponential backoff (1s, 2s, 4s, ...) on HTTP
//! 429, 5xx, and network errors. Other 4xx responses fail immediately.

use anyhow::{anyhow, bail, Result};
use std::time::Duration;
use tracing::{debug, error, warn};

use rag_assistant_core::embedding::{mock_embedding, EmbeddingProvider};

use crate::config::{env_value, EmbeddingConfig};

/// Text-to-vector service with mock fallback.
pub struct Embedder {
    provider: String,
    model: String,
    dims: usize,
    endpoint: String,
    api_key: Option<String>,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl Embedder {
    /// Build an embedder, reading the provider's API key from the environment.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key_env().and_then(env_value);
        Self::new(config, api_key)
    }

    /// Build an embedder with an explicit API key.
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let embedder = Self {
            provider: config.provider.clone(),
            model: config.model_name().to_string(),
            dims: config.dims,
            endpoint: config.endpoint().to_string(),
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client,
        };

        if embedder.provider != "mock" && embedder.api_key.is_none() {
            warn!(
                provider = %embedder.provider,
                env = config.api_key_env().unwrap_or_default(),
                "No embedding API key set; using mock embeddings"
            );
        }

        Ok(embedder)
    }

    /// `true` when no remote provider will be called.
    pub fn is_mock(&self) -> bool {
        self.provider == "mock" || self.api_key.is_none()
    }

    /// Provider name as reported in status output (`"mock"` when falling back).
    pub fn provider_name(&self) -> &str {
        if self.is_mock() {
            "mock"
        } else {
            &self.provider
        }
    }

    /// Embed a search query.
    pub async fn embed_query(&self, text: &str) -> Vec<f32> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await;
        vectors.pop().unwrap_or_else(|| mock_embedding(text, self.dims))
    }

    /// Embed many texts; the result has one vector per input, in order.
    pub async fn embed_texts(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }

        let api_key = match (&self.api_key, self.provider.as_str()) {
            (_, "mock") | (None, _) => return self.mock_all(texts),
            (Some(key), _) => key,
        };

        match self.embed_remote(api_key, texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                error!(provider = %self.provider, error = %e, "Embedding request failed; using mock embeddings");
                self.mock_all(texts)
            }
        }
    }

    fn mock_all(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| mock_embedding(t, self.dims)).collect()
    }

    async fn embed_remote(&self, api_key: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let vectors = self.post_batch(api_key, batch).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "expected {} embeddings, provider returned {}",
                    batch.len(),
                    vectors.len()
                );
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
                bail!(
                    "expected {}-dimensional embeddings, provider returned {}",
                    self.dims,
                    bad.len()
                );
            }
            all.extend(vectors);
        }

        Ok(all)
    }

    async fn post_batch(&self, api_key: &str, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = match self.provider.as_str() {
            "jina" => serde_json::json!({
                "model": self.model,
                "input": batch,
                "encoding_format": "float",
            }),
            _ => serde_json::json!({
                "model": self.model,
                "input": batch,
            }),
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "Retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!(
                            "{} API error {}: {}",
                            self.provider,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("{} API error {}: {}", self.provider, status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Embedding failed after retries")))
    }
}

impl EmbeddingProvider for Embedder {
    fn model_name(&self) -> &str {
        if self.is_mock() {
            "mock"
        } else {
            &self.model
        }
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parse an embeddings response (`{"data": [{"embedding": [...], "index": n}]}`).
///
/// Items are returned in `index` order when every item carries one, and in
/// array order otherwise.
pub fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    let mut items = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))?;

        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("Invalid embeddings response: non-numeric value"))
            })
            .collect::<Result<Vec<f32>>>()?;

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        items.push((index, vec));
    }

    items.sort_by_key(|(index, _)| *index);
    Ok(items.into_iter().map(|(_, vec)| vec).collect())
}
