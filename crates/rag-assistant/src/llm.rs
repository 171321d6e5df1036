//! Answer generation.
//!
//! [`LlmProvider`] is the seam for text generation backends. Two are
//! provided: [`GeminiProvider`] (Google `generateContent`) and
//! [`OpenAiChatProvider`] (OpenAI-compatible `/chat/completions`).
//!
//! [`Responder`] wraps an optional provider and never fails: without a
//! provider, or when the provider errors, it answers with
//! [`mock_response`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

use rag_assistant_core::models::DocumentChunk;
use rag_assistant_core::prompt::{build_rag_prompt, mock_response};

use crate::config::{env_value, LlmConfig};

/// Sampling parameters passed with every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for GenerationParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

/// A text generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, e.g. `"gemini"`.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Generate a completion for a single-turn prompt.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

// ============ Gemini ============

/// Google Gemini via `{base}/{model}:generateContent`, key in `x-goog-api-key`.
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url().to_string(),
            model: config.model_name().to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Extract `candidates[0].content.parts[0].text` from a Gemini response.
pub fn parse_gemini_response(json: serde_json::Value) -> Result<String> {
    let response: GenerateResponse = serde_json::from_value(json)
        .map_err(|e| anyhow!("Failed to parse Gemini response: {}", e))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| anyhow!("No text in Gemini response"))
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                top_k: params.top_k,
                top_p: params.top_p,
                max_output_tokens: params.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Gemini request failed: {}", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to read Gemini response: {}", e.without_url()))?;
        parse_gemini_response(json)
    }
}

// ============ OpenAI-compatible chat ============

/// OpenAI-compatible `POST {base}/chat/completions`.
pub struct OpenAiChatProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiChatProvider {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url().to_string(),
            model: config.model_name().to_string(),
            api_key,
        })
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
pub fn parse_openai_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid chat completion response: missing message content"))
}

#[async_trait]
impl LlmProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("OpenAI request failed: {}", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_chat_response(&json)
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Build the configured provider, or `None` for `mock` and when the API key
/// is missing.
pub fn create_provider(config: &LlmConfig) -> Result<Option<Box<dyn LlmProvider>>> {
    let Some(env) = config.api_key_env() else {
        return Ok(None);
    };
    let Some(api_key) = env_value(env) else {
        warn!(provider = %config.provider, env, "No LLM API key set; using mock responses");
        return Ok(None);
    };

    let provider: Box<dyn LlmProvider> = match config.provider.as_str() {
        "gemini" => Box::new(GeminiProvider::new(config, api_key)?),
        "openai" => Box::new(OpenAiChatProvider::new(config, api_key)?),
        other => bail!("Unknown llm provider: '{}'", other),
    };
    Ok(Some(provider))
}

/// Generates answers from retrieved context, falling back to templates.
pub struct Responder {
    provider: Option<Box<dyn LlmProvider>>,
    params: GenerationParams,
}

impl Responder {
    pub fn new(provider: Option<Box<dyn LlmProvider>>, params: GenerationParams) -> Self {
        Self { provider, params }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self::new(create_provider(config)?, GenerationParams::from(config)))
    }

    /// Always-templated responder.
    pub fn mock() -> Self {
        Self::new(None, GenerationParams::default())
    }

    pub fn provider_name(&self) -> &str {
        self.provider.as_ref().map(|p| p.name()).unwrap_or("mock")
    }

    pub fn model(&self) -> &str {
        self.provider.as_ref().map(|p| p.model()).unwrap_or("mock")
    }

    /// Answer `query` from `chunks`. Never fails.
    pub async fn generate_response(&self, query: &str, chunks: &[DocumentChunk]) -> String {
        let Some(provider) = &self.provider else {
            return mock_response(query, chunks);
        };

        let prompt = build_rag_prompt(query, chunks);
        match provider.generate(&prompt, &self.params).await {
            Ok(text) => text,
            Err(e) => {
                error!(provider = provider.name(), error = %e, "Generation failed; using mock response");
                mock_response(query, chunks)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        reply: Result<String, String>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted-1"
        }
        async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    fn chunk(content: &str) -> DocumentChunk {
        DocumentChunk {
            id: "c1".into(),
            document_id: "d1".into(),
            content: content.into(),
            embedding: Vec::new(),
            chunk_index: 0,
            metadata: serde_json::json!({ "filename": "guide.md" }),
        }
    }

    #[test]
    fn test_parse_gemini_response() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Rust is fast." }, { "text": "ignored" }] } }]
        });
        assert_eq!(parse_gemini_response(json).unwrap(), "Rust is fast.");
    }

    #[test]
    fn test_parse_gemini_response_empty() {
        assert!(parse_gemini_response(serde_json::json!({ "candidates": [] })).is_err());
        assert!(parse_gemini_response(serde_json::json!({})).is_err());
        assert!(parse_gemini_response(serde_json::json!({
            "candidates": [{ "content": { "parts": [] } }]
        }))
        .is_err());
    }

    #[test]
    fn test_parse_openai_chat_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hi" } }]
        });
        assert_eq!(parse_openai_chat_response(&json).unwrap(), "Hi");
        assert!(parse_openai_chat_response(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_gemini_request_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: "p".into() }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 1024,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "p");
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
    }

    /// Fake Gemini endpoint that records each request's path, query,
    /// key header, and body.
    async fn spawn_fake_gemini(
        status: axum::http::StatusCode,
    ) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        use axum::extract::State;
        use axum::http::{HeaderMap, StatusCode, Uri};
        use axum::{Json, Router};

        type Seen = Arc<Mutex<Vec<serde_json::Value>>>;

        async fn handler(
            State((seen, status)): State<(Seen, StatusCode)>,
            uri: Uri,
            headers: HeaderMap,
            Json(body): Json<serde_json::Value>,
        ) -> (StatusCode, Json<serde_json::Value>) {
            seen.lock().unwrap().push(serde_json::json!({
                "path": uri.path(),
                "query": uri.query(),
                "key": headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()),
                "body": body,
            }));
            if status != StatusCode::OK {
                return (status, Json(serde_json::json!({ "error": "quota" })));
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "candidates": [{ "content": { "parts": [{ "text": "Cargo builds crates." }] } }]
                })),
            )
        }

        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .fallback(handler)
            .with_state((seen.clone(), status));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/models", addr), seen)
    }

    fn gemini_config(url: &str) -> LlmConfig {
        LlmConfig {
            provider: "gemini".into(),
            url: Some(url.to_string()),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_gemini_generate_sends_key_in_header() {
        let (url, seen) = spawn_fake_gemini(axum::http::StatusCode::OK).await;
        let provider = GeminiProvider::new(&gemini_config(&url), "SECRET-KEY-123".into()).unwrap();

        let text = provider
            .generate("What is Cargo?", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "Cargo builds crates.");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let request = &seen[0];
        assert_eq!(request["path"], "/models/gemini-1.5-flash:generateContent");
        assert!(request["query"].is_null());
        assert_eq!(request["key"], "SECRET-KEY-123");
        assert_eq!(request["body"]["contents"][0]["parts"][0]["text"], "What is Cargo?");
        assert_eq!(request["body"]["generationConfig"]["topK"], 40);
        assert_eq!(request["body"]["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[tokio::test]
    async fn test_gemini_http_error_is_reported() {
        let (url, _) = spawn_fake_gemini(axum::http::StatusCode::TOO_MANY_REQUESTS).await;
        let provider = GeminiProvider::new(&gemini_config(&url), "SECRET-KEY-123".into()).unwrap();

        let err = provider
            .generate("q", &GenerationParams::default())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("Gemini API error 429"), "{}", err);
        assert!(!err.contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn test_gemini_transport_error_hides_key() {
        let provider = GeminiProvider::new(
            &gemini_config("http://127.0.0.1:1/models"),
            "SECRET-KEY-123".into(),
        )
        .unwrap();

        let err = provider
            .generate("q", &GenerationParams::default())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("Gemini request failed"), "{}", err);
        assert!(!err.contains("SECRET-KEY-123"), "{}", err);
        assert!(!err.contains("127.0.0.1:1"), "{}", err);
    }

    #[tokio::test]
    async fn test_without_provider_uses_mock() {
        let responder = Responder::mock();
        assert_eq!(responder.provider_name(), "mock");
        let chunks = vec![chunk("Ownership rules.")];
        assert_eq!(
            responder.generate_response("what?", &chunks).await,
            mock_response("what?", &chunks)
        );
    }

    #[tokio::test]
    async fn test_provider_receives_prompt_with_context() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let provider = Scripted {
            reply: Ok("generated".into()),
            prompts: prompts.clone(),
        };
        let responder = Responder::new(Some(Box::new(provider)), GenerationParams::default());
        let answer = responder
            .generate_response("what is ownership?", &[chunk("Ownership rules.")])
            .await;
        assert_eq!(answer, "generated");
        assert_eq!(responder.model(), "scripted-1");
        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("Source: guide.md\nOwnership rules."));
        assert!(prompts[0].contains("Question: what is ownership?"));
    }

    #[tokio::test]
    async fn test_provider_error_falls_back_to_mock() {
        let provider = Scripted {
            reply: Err("boom".into()),
            prompts: Arc::default(),
        };
        let responder = Responder::new(Some(Box::new(provider)), GenerationParams::default());
        let chunks = vec![chunk("Borrowing rules.")];
        assert_eq!(
            responder.generate_response("borrowing?", &chunks).await,
            mock_response("borrowing?", &chunks)
        );
    }

    #[test]
    fn test_mock_config_has_no_provider() {
        let config = LlmConfig {
            provider: "mock".into(),
            ..LlmConfig::default()
        };
        assert!(create_provider(&config).unwrap().is_none());
    }
}
