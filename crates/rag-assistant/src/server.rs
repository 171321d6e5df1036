//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/api/status` | Store, providers, document count, missing keys |
//! | `GET`    | `/api/documents` | Document list, newest first |
//! | `POST`   | `/api/documents` | Multipart upload, one part per file |
//! | `GET`    | `/api/documents/{id}` | Document with its chunks |
//! | `DELETE` | `/api/documents/{id}` | Delete a document and its chunks |
//! | `POST`   | `/api/search` | `{ query, limit?, threshold? }` similarity search |
//! | `POST`   | `/api/chat` | `{ session_id?, message }` ask within a chat session |
//! | `GET`    | `/api/chat/{session_id}` | Messages of a chat session |
//! | `POST`   | `/api/greet` | `{ message }` landing-page greeting |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `payload_too_large` (413), `internal` (500). A multi-file upload whose
//! body fits the request limit always answers 200 with a per-file status;
//! one bad file does not fail the request.
//!
//! Chat sessions live in this process only and are lost on restart. At most
//! `[server].max_sessions` are kept; the least recently used is dropped to
//! make room for a new one.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use rag_assistant_core::greeter::greet;
use rag_assistant_core::models::{format_file_size, ChatMessage, Document, SearchResult};
use rag_assistant_core::session::ChatSession;

use crate::config::Config;
use crate::rag::{RagService, ServiceStatus, UploadStatus};

/// Files accepted in one multipart request.
const MAX_FILES_PER_REQUEST: u64 = 10;

type SharedSession = Arc<tokio::sync::Mutex<ChatSession>>;

/// Chat sessions by id, bounded, with least-recently-used eviction.
struct SessionStore {
    capacity: usize,
    clock: u64,
    entries: HashMap<String, (u64, SharedSession)>,
}

impl SessionStore {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            entries: HashMap::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look a session up and mark it as used.
    fn get(&mut self, id: &str) -> Option<SharedSession> {
        let now = self.tick();
        self.entries.get_mut(id).map(|(used, session)| {
            *used = now;
            session.clone()
        })
    }

    fn insert(&mut self, session: ChatSession) -> SharedSession {
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (used, _))| *used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
            debug!(session_id = %oldest, "Evicted chat session");
        }

        let now = self.tick();
        let id = session.id().to_string();
        let shared = Arc::new(tokio::sync::Mutex::new(session));
        self.entries.insert(id, (now, shared.clone()));
        shared
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Clone)]
struct AppState {
    service: Arc<RagService>,
    /// Per-session locks; the store lock is only held to look a session up.
    sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    fn session(&self, id: &str) -> Result<Option<SharedSession>, AppError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| internal("chat session lock poisoned"))?;
        Ok(sessions.get(id))
    }

    fn new_session(&self) -> Result<SharedSession, AppError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| internal("chat session lock poisoned"))?;
        Ok(sessions.insert(ChatSession::new()))
    }
}

/// Open the configured store and serve the API on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(RagService::from_config(config).await?);
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("RAG assistant listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router around a service.
pub fn router(service: Arc<RagService>) -> Router {
    let body_limit = service
        .config()
        .upload
        .max_file_size
        .saturating_mul(MAX_FILES_PER_REQUEST)
        .saturating_add(1024 * 1024);

    let max_sessions = service.config().server.max_sessions;
    let state = AppState {
        service,
        sessions: Arc::new(Mutex::new(SessionStore::new(max_sessions))),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/status", get(handle_status))
        .route(
            "/api/documents",
            get(handle_list_documents).post(handle_upload),
        )
        .route(
            "/api/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/api/search", post(handle_search))
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/{session_id}", get(handle_chat_history))
        .route("/api/greet", post(handle_greet))
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = ?err, "Request failed");
        internal(err.to_string())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn payload_too_large(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        code: "payload_too_large".to_string(),
        message: message.into(),
    }
}

/// Map a multipart read failure; exceeding the body limit is a 413.
fn multipart_error(context: &str, err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large(format!("{}: upload exceeds the request size limit", context))
    } else {
        bad_request(format!("{}: {}", context, err))
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health, GET /api/status ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_status(State(state): State<AppState>) -> Result<Json<ServiceStatus>, AppError> {
    Ok(Json(state.service.status().await?))
}

// ============ /api/documents ============

/// Document listing entry (content and chunks omitted).
#[derive(Serialize)]
struct DocumentSummary {
    id: String,
    filename: String,
    file_type: String,
    size: u64,
    size_label: String,
    uploaded_at: DateTime<Utc>,
}

impl From<Document> for DocumentSummary {
    fn from(doc: Document) -> Self {
        Self {
            size_label: format_file_size(doc.size),
            id: doc.id,
            filename: doc.filename,
            file_type: doc.file_type,
            size: doc.size,
            uploaded_at: doc.uploaded_at,
        }
    }
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state
        .service
        .list_documents()
        .await?
        .into_iter()
        .map(DocumentSummary::from)
        .collect();
    Ok(Json(DocumentListResponse { documents }))
}

#[derive(Serialize)]
struct UploadResponse {
    results: Vec<UploadStatus>,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart field", e))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(&format!("Failed to read {}", filename), e))?;
        files.push((filename, data.to_vec()));
    }

    if files.is_empty() {
        return Err(bad_request("no files in upload"));
    }

    let results = state.service.upload_files(&files).await;
    Ok(Json(UploadResponse { results }))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    state
        .service
        .get_document(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("document not found: {}", id)))
}

#[derive(Serialize)]
struct DeleteResponse {
    id: String,
    deleted: bool,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    if !state.service.delete_document(&id).await? {
        return Err(not_found(format!("document not found: {}", id)));
    }
    Ok(Json(DeleteResponse { id, deleted: true }))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    limit: Option<usize>,
    threshold: Option<f32>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let retrieval = &state.service.config().retrieval;
    let limit = req.limit.unwrap_or(retrieval.limit);
    let threshold = req.threshold.unwrap_or(retrieval.threshold);
    if limit == 0 {
        return Err(bad_request("limit must be >= 1"));
    }

    let results = state
        .service
        .search_similar(req.query.trim(), limit, threshold)
        .await?;
    Ok(Json(SearchResponse { results }))
}

// ============ /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    session_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    message: ChatMessage,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let session = match &req.session_id {
        Some(id) => state
            .session(id)?
            .ok_or_else(|| not_found(format!("chat session not found: {}", id)))?,
        None => state.new_session()?,
    };

    let mut session = session.lock().await;
    let reply = state
        .service
        .chat(&mut session, &req.message)
        .await?
        .ok_or_else(|| bad_request("message must not be empty"))?;

    Ok(Json(ChatResponse {
        session_id: session.id().to_string(),
        message: reply,
    }))
}

#[derive(Serialize)]
struct ChatHistoryResponse {
    session_id: String,
    messages: Vec<ChatMessage>,
}

async fn handle_chat_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ChatHistoryResponse>, AppError> {
    let session = state
        .session(&session_id)?
        .ok_or_else(|| not_found(format!("chat session not found: {}", session_id)))?;
    let session = session.lock().await;
    Ok(Json(ChatHistoryResponse {
        session_id,
        messages: session.messages().to_vec(),
    }))
}

// ============ POST /api/greet ============

#[derive(Deserialize)]
struct GreetRequest {
    message: String,
}

#[derive(Serialize)]
struct GreetResponse {
    reply: String,
}

async fn handle_greet(Json(req): Json<GreetRequest>) -> Result<Json<GreetResponse>, AppError> {
    greet(&req.message)
        .map(|reply| Json(GreetResponse { reply }))
        .ok_or_else(|| bad_request("message must not be empty"))
}
