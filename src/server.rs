//! HTTP boundary: a thin axum layer over the conversation loop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::agent::Agent;
use crate::error::{ChatError, Result};
use crate::llm::LanguageModel;
use crate::transcript::SessionStore;

pub struct AppState<M: LanguageModel + 'static> {
    agent: Arc<Agent<M>>,
    sessions: SessionStore,
}

impl<M: LanguageModel + 'static> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            agent: Arc::clone(&self.agent),
            sessions: self.sessions.clone(),
        }
    }
}

impl<M: LanguageModel + 'static> AppState<M> {
    pub fn new(agent: Agent<M>) -> Self {
        Self {
            agent: Arc::new(agent),
            sessions: SessionStore::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omitting the id starts a new session.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: String,
}

/// Build the application router. The original deployment fronted a browser
/// widget, hence the permissive CORS layer.
pub fn router<M: LanguageModel + 'static>(state: AppState<M>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(chat::<M>))
        .route("/chat", post(chat::<M>))
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .with_state(state)
}

pub async fn serve<M: LanguageModel + 'static>(
    state: AppState<M>,
    addr: SocketAddr,
) -> Result<()> {
    let app = router(state);
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|err| ChatError::Protocol(format!("server error: {err}")))?;
    Ok(())
}

async fn chat<M: LanguageModel + 'static>(
    State(state): State<AppState<M>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let session_id = req
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let transcript = state.sessions.get_or_create(&session_id).await;
    let mut transcript = transcript.lock().await;

    match state.agent.respond(&mut transcript, req.message).await {
        Ok(reply) => Json(ChatResponse { reply, session_id }).into_response(),
        Err(err) => {
            error!(%session_id, error = %err, "turn failed");
            let status = match err {
                ChatError::ToolLoopExceeded { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({"error": err.to_string()}))).into_response()
        }
    }
}
