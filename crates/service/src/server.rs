use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Json, Router};
use reportfinder_core::CoreError;
use reportfinder_engine::{
    ChatReply, EngineError, EngineOperation, InMemorySessionStore, OperationOutcome, ReportEngine,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::SessionSettings;

#[derive(Clone)]
struct AppState {
    engine: Arc<ReportEngine>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

pub fn router(engine: Arc<ReportEngine>) -> Router {
    let state = Arc::new(AppState { engine });
    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/operations", post(handle_operation))
        .with_state(state)
}

pub async fn serve(
    engine: Arc<ReportEngine>,
    sessions: Arc<InMemorySessionStore>,
    settings: &SessionSettings,
    bind: &str,
) -> anyhow::Result<()> {
    if let Some(minutes) = settings.idle_timeout_minutes {
        spawn_idle_sweeper(
            sessions,
            chrono::Duration::minutes(minutes as i64),
            Duration::from_secs(settings.sweep_interval_secs.max(1)),
        );
    }
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

fn spawn_idle_sweeper(
    sessions: Arc<InMemorySessionStore>,
    max_idle: chrono::Duration,
    every: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle(max_idle);
            if evicted > 0 {
                info!(evicted, remaining = sessions.len(), "evicted idle sessions");
            }
        }
    });
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    if body.message.trim().is_empty() {
        return Err(AppError::bad_request("message must not be empty"));
    }
    let session_id = body.session_id.as_deref().filter(|id| !id.trim().is_empty());
    let reply = state.engine.process_message(session_id, &body.message).await;
    Ok(Json(reply))
}

async fn handle_operation(
    State(state): State<Arc<AppState>>,
    Json(operation): Json<EngineOperation>,
) -> Result<Json<OperationOutcome>, AppError> {
    let outcome = state.engine.execute(operation).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ReportNotFound(_) => Self::NotFound(err.to_string()),
            EngineError::Core(CoreError::InvalidParameters(_) | CoreError::MissingPath(_)) => {
                Self::BadRequest(err.to_string())
            }
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
