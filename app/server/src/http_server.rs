//! HTTP API for questions and the Telegram webhook

use axum::{
    extract::State as AxumState,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use hybrid_qa::{HybridQa, Route};

use crate::telegram::{deliver_reply, extract_question, format_reply, ChatReplier, Update, APOLOGY_REPLY};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub route: Route,
    pub answer: String,
}

#[derive(Clone)]
pub struct AppState {
    pub qa: Arc<HybridQa>,
    /// Set when a bot token is configured.
    pub replier: Option<Arc<dyn ChatReplier>>,
}

async fn health_check() -> Json<Value> {
    Json(json!({ "message": "Telegram Webhook + RAG API Running" }))
}

async fn handle_ask(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, String)> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "question must not be empty".to_string()));
    }

    tracing::info!(question = %question, "Ask request");
    let answer = state.qa.ask(question).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to answer question");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(AskResponse {
        route: answer.route,
        answer: answer.answer,
    }))
}

async fn handle_webhook(
    AxumState(state): AxumState<AppState>,
    Json(update): Json<Update>,
) -> Json<Value> {
    let ack = Json(json!({ "status": "ok" }));

    let Some(incoming) = extract_question(&update) else {
        tracing::debug!(update_id = update.update_id, "Ignoring non-text update");
        return ack;
    };
    let Some(replier) = state.replier.as_ref() else {
        tracing::warn!("Webhook update received but no bot token is configured");
        return ack;
    };

    let username = update
        .message
        .as_ref()
        .and_then(|m| m.from.as_ref())
        .and_then(|u| u.username.as_deref())
        .unwrap_or("unknown");
    tracing::info!(chat_id = incoming.chat_id, username = %username, "📨 Telegram question");

    let reply = match state.qa.ask(&incoming.text).await {
        Ok(answer) => format_reply(&answer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to answer Telegram question");
            APOLOGY_REPLY.to_string()
        }
    };

    if let Err(e) = deliver_reply(&**replier, incoming.chat_id, &reply).await {
        tracing::error!(error = %e, chat_id = incoming.chat_id, "Failed to send Telegram reply");
    }
    ack
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health_check))
        .route("/ask", post(handle_ask))
        .route("/webhook", post(handle_webhook))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = router(state);

    tracing::info!("🚀 Hybrid QA API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
