//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, pipeline state, entry count |
//! | `POST` | `/api/chat` | Ask a question in a session |
//! | `POST` | `/api/upload` | Ingest base64-encoded files |
//! | `POST` | `/api/reset` | Clear a session's conversation history |
//! | `GET`  | `/api/history` | A session's conversation turns |
//! | `GET`  | `/webhook` | WhatsApp subscription verification |
//! | `POST` | `/webhook` | WhatsApp events; text messages get an answer |
//!
//! Requests without a `session_id` use the `"default"` session. WhatsApp
//! conversations use the sender's phone number as their session id.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (502, the embedding
//! or language model service failed), `internal` (500).
//!
//! # Concurrency
//!
//! The assistant sits behind a `tokio::sync::RwLock`: chat requests share
//! the read lock, uploads take the write lock. Session histories have
//! their own mutex and are never held across a model call.

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use ragchat_core::error::RagError;
use ragchat_core::models::{Answer, ConversationTurn, PipelineState, SourceRef};

use crate::assistant::Assistant;
use crate::config::Config;
use crate::ingest::IngestReport;
use crate::loader::Skipped;
use crate::session::{SessionStore, DEFAULT_SESSION};
use crate::whatsapp::{self, WhatsAppClient};

/// Upload bodies carry base64 file contents, so allow more than axum's 2 MB default.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    assistant: Arc<RwLock<Assistant>>,
    sessions: Arc<Mutex<SessionStore>>,
    whatsapp: Arc<WhatsAppClient>,
}

impl AppState {
    pub fn new(assistant: Assistant) -> Result<Self> {
        let whatsapp = WhatsAppClient::new(&assistant.config().whatsapp)?;
        Ok(Self {
            assistant: Arc::new(RwLock::new(assistant)),
            sessions: Arc::new(Mutex::new(SessionStore::new())),
            whatsapp: Arc::new(whatsapp),
        })
    }
}

/// Build the router with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .route("/api/upload", post(handle_upload))
        .route("/api/reset", post(handle_reset))
        .route("/api/history", get(handle_history))
        .route("/webhook", get(handle_webhook_verify).post(handle_webhook_event))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Open the assistant, bootstrap the index if needed, and serve on
/// `server.bind` until the process is terminated.
pub async fn run_server(config: Config) -> Result<()> {
    let bind_addr = config.server.bind.clone();
    let mut assistant = Assistant::open(config).await?;

    match assistant.bootstrap().await {
        Ok(Some(report)) => info!(
            documents = report.documents_indexed,
            chunks = report.chunks_indexed,
            skipped = report.skipped.len(),
            "bootstrap ingest done"
        ),
        Ok(None) => {}
        // Serve anyway; documents can still be uploaded.
        Err(e) => warn!(error = %format!("{:#}", e), "bootstrap ingest failed"),
    }

    let app = router(AppState::new(assistant)?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("ragchat server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn upstream_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_error",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        if err.is_upstream() {
            warn!(error = %err, "upstream service failed");
            upstream_error(err.to_string())
        } else {
            error!(error = %err, "request failed");
            internal(err.to_string())
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<RagError>() {
            Ok(rag) => rag.into(),
            Err(other) => {
                error!(error = %format!("{:#}", other), "request failed");
                internal(format!("{:#}", other))
            }
        }
    }
}

fn session_id(id: Option<String>) -> String {
    id.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string())
}

async fn session_history(state: &AppState, session_id: &str) -> Vec<ConversationTurn> {
    state
        .sessions
        .lock()
        .await
        .get(session_id)
        .map(|c| c.turns().to_vec())
        .unwrap_or_default()
}

async fn record_exchange(state: &AppState, session_id: &str, question: &str, answer: &Answer) {
    let mut sessions = state.sessions.lock().await;
    let conv = sessions.get_or_create(session_id);
    conv.push_user(question);
    conv.push_assistant(answer.answer.clone(), answer.sources.clone());
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    state: PipelineState,
    entries: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let assistant = state.assistant.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: assistant.state(),
        entries: assistant.index().entries().len(),
    })
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<SourceRef>,
    session_id: String,
    timestamp: DateTime<Utc>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let session_id = session_id(req.session_id);

    let history = session_history(&state, &session_id).await;

    let answer = {
        let assistant = state.assistant.read().await;
        assistant.ask(message, &history).await?
    };
    record_exchange(&state, &session_id, message, &answer).await;

    Ok(Json(ChatResponse {
        answer: answer.answer,
        sources: answer.sources,
        session_id,
        timestamp: Utc::now(),
    }))
}

// ============ POST /api/upload ============

#[derive(Deserialize)]
struct UploadFile {
    name: String,
    content_base64: String,
}

#[derive(Deserialize)]
struct UploadRequest {
    files: Vec<UploadFile>,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<IngestReport>, AppError> {
    if req.files.is_empty() {
        return Err(bad_request("files must not be empty"));
    }

    let mut files = Vec::with_capacity(req.files.len());
    let mut undecodable = Vec::new();
    for file in req.files {
        match base64::engine::general_purpose::STANDARD.decode(file.content_base64.trim()) {
            Ok(bytes) => files.push((file.name, bytes)),
            Err(e) => undecodable.push(Skipped {
                name: file.name,
                reason: format!("invalid base64: {}", e),
            }),
        }
    }

    let mut report = {
        let mut assistant = state.assistant.write().await;
        assistant.ingest_uploads(files).await?
    };
    report.skipped.extend(undecodable);

    info!(
        documents = report.documents_indexed,
        chunks = report.chunks_indexed,
        skipped = report.skipped.len(),
        "upload ingested"
    );
    Ok(Json(report))
}

// ============ POST /api/reset ============

#[derive(Deserialize, Default)]
struct ResetRequest {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_reset(
    State(state): State<AppState>,
    body: Option<Json<ResetRequest>>,
) -> Json<MessageResponse> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let session_id = session_id(req.session_id);
    state.sessions.lock().await.reset(&session_id);
    Json(MessageResponse {
        message: "Conversation reset successfully".to_string(),
    })
}

// ============ GET /api/history ============

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    turns: Vec<ConversationTurn>,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let session_id = session_id(query.session_id);
    let turns = session_history(&state, &session_id).await;
    Json(HistoryResponse { session_id, turns })
}

// ============ GET /webhook ============

async fn handle_webhook_verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode");
    let token = params.get("hub.verify_token");
    match (mode, token) {
        (Some(mode), Some(token)) => {
            if state.whatsapp.verify(mode, token) {
                info!("whatsapp webhook verified");
                let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
                (StatusCode::OK, challenge).into_response()
            } else {
                warn!(mode = %mode, "whatsapp webhook verification failed");
                (StatusCode::FORBIDDEN, "Verification failed").into_response()
            }
        }
        _ => (StatusCode::OK, "WhatsApp webhook").into_response(),
    }
}

// ============ POST /webhook ============

#[derive(Serialize)]
struct WebhookStatus {
    status: &'static str,
}

/// Always answers 200 so Meta does not redeliver the event; the outcome is
/// in `status`: `ignored`, `success`, or `error` when the reply could not
/// be delivered.
async fn handle_webhook_event(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<WebhookStatus> {
    let Some(message) = whatsapp::incoming_text(&payload) else {
        debug!("whatsapp event ignored");
        return Json(WebhookStatus { status: "ignored" });
    };
    info!(from = %message.from, "whatsapp message received");

    let history = session_history(&state, &message.from).await;
    let result = {
        let assistant = state.assistant.read().await;
        assistant.ask(&message.body, &history).await
    };
    let reply = match result {
        Ok(answer) => {
            record_exchange(&state, &message.from, &message.body, &answer).await;
            answer.answer
        }
        Err(e) => {
            warn!(from = %message.from, error = %e, "whatsapp question failed");
            whatsapp::APOLOGY.to_string()
        }
    };

    match state.whatsapp.send_text(&message.from, &reply).await {
        Ok(()) => Json(WebhookStatus { status: "success" }),
        Err(e) => {
            error!(to = %message.from, error = %format!("{:#}", e), "whatsapp reply failed");
            Json(WebhookStatus { status: "error" })
        }
    }
}
