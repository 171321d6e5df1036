//! TOML configuration parsing and validation.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! Secrets never live in the file: API keys and hosted database credentials
//! are read from the environment (see the `*_ENV` constants).
//!
//! ```toml
//! [store]
//! backend = "sqlite"            # sqlite | supabase | memory
//! path = "./data/rag.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! limit = 5
//! threshold = 0.7
//!
//! [embedding]
//! provider = "jina"             # jina | openai | mock
//! model = "jina-embeddings-v2-base-en"
//! dims = 768
//!
//! [llm]
//! provider = "gemini"           # gemini | openai | mock
//! model = "gemini-1.5-flash"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use rag_assistant_core::chunk::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use rag_assistant_core::embedding::DEFAULT_DIMS;
use rag_assistant_core::validate::{UploadLimits, DEFAULT_EXTENSIONS, DEFAULT_MAX_FILE_SIZE};

pub const JINA_API_KEY_ENV: &str = "JINA_API_KEY";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./data/rag.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            threshold: default_threshold(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_threshold() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_extensions: default_extensions(),
        }
    }
}

impl UploadConfig {
    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_file_size: self.max_file_size,
            allowed_extensions: self
                .allowed_extensions
                .iter()
                .map(|e| {
                    let e = e.to_lowercase();
                    if e.starts_with('.') {
                        e
                    } else {
                        format!(".{}", e)
                    }
                })
                .collect(),
        }
    }
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}
fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Endpoint override (OpenAI-compatible `/embeddings` URL).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: DEFAULT_DIMS,
            url: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn model_name(&self) -> &str {
        if let Some(model) = self.model.as_deref() {
            return model;
        }
        match self.provider.as_str() {
            "openai" => "text-embedding-3-small",
            "mock" => "mock",
            _ => "jina-embeddings-v2-base-en",
        }
    }

    pub fn endpoint(&self) -> &str {
        if let Some(url) = self.url.as_deref() {
            return url;
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com/v1/embeddings",
            _ => "https://api.jina.ai/v1/embeddings",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "jina" => Some(JINA_API_KEY_ENV),
            "openai" => Some(OPENAI_API_KEY_ENV),
            _ => None,
        }
    }
}

fn default_embedding_provider() -> String {
    "jina".to_string()
}
fn default_dims() -> usize {
    DEFAULT_DIMS
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn model_name(&self) -> &str {
        if let Some(model) = self.model.as_deref() {
            return model;
        }
        match self.provider.as_str() {
            "openai" => "gpt-4o-mini",
            "mock" => "mock",
            _ => "gemini-1.5-flash",
        }
    }

    pub fn base_url(&self) -> &str {
        if let Some(url) = self.url.as_deref() {
            return url.trim_end_matches('/');
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com/v1",
            _ => "https://generativelanguage.googleapis.com/v1beta/models",
        }
    }

    pub fn api_key_env(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "gemini" => Some(GEMINI_API_KEY_ENV),
            "openai" => Some(OPENAI_API_KEY_ENV),
            _ => None,
        }
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_k() -> u32 {
    40
}
fn default_top_p() -> f32 {
    0.95
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Also write chat messages to the store.
    #[serde(default)]
    pub persist: bool,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            persist: false,
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Chat sessions kept in memory; the least recently used is dropped
    /// when a new one would exceed this.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_max_sessions() -> usize {
    1000
}

/// Read a non-empty environment variable.
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Environment variables whose absence degrades behaviour under `config`:
/// mock embeddings or answers, or an unusable hosted store.
pub fn missing_api_keys(config: &Config) -> Vec<&'static str> {
    let mut wanted = Vec::new();
    wanted.extend(config.embedding.api_key_env());
    wanted.extend(config.llm.api_key_env());
    if config.store.backend == "supabase" {
        wanted.push(SUPABASE_URL_ENV);
        wanted.push(SUPABASE_ANON_KEY_ENV);
    }
    wanted.dedup();
    wanted.into_iter().filter(|name| env_value(name).is_none()).collect()
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    match config.store.backend.as_str() {
        "sqlite" | "supabase" | "memory" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be sqlite, supabase, or memory.",
            other
        ),
    }

    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }

    if config.retrieval.limit == 0 {
        bail!("retrieval.limit must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.threshold) {
        bail!("retrieval.threshold must be in [-1.0, 1.0]");
    }

    if config.upload.allowed_extensions.is_empty() {
        bail!("upload.allowed_extensions must not be empty");
    }

    match config.embedding.provider.as_str() {
        "jina" | "openai" | "mock" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be jina, openai, or mock.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.llm.provider.as_str() {
        "gemini" | "openai" | "mock" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be gemini, openai, or mock.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&config.llm.top_p) {
        bail!("llm.top_p must be in [0.0, 1.0]");
    }

    if config.server.max_sessions == 0 {
        bail!("server.max_sessions must be >= 1");
    }

    Ok(())
}
