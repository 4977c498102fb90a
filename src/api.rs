use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info, warn};

use crate::analytics::{normalize_dashboard, Analytics, DashboardReport, DashboardView};
use crate::chat::{provider::DynChatProvider, ChatRequest, ChatResponse};
use crate::chat_log::{ChatLogEntry, ChatLogStore};
use crate::config::AppConfig;
use crate::error::{ApiError, ChatError, ValidationDetails};
use crate::metrics::{self, Metrics};

/// JSON request bodies above this size are rejected.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub analytics: Analytics,
    pub provider: DynChatProvider,
    pub chat_log: Arc<ChatLogStore>,
    pub metrics: Option<Metrics>,
}

pub fn create_router(state: AppState) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(&state.config.frontend_origin)
        .with_context(|| format!("invalid FRONTEND_ORIGIN `{}`", state.config.frontend_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/chat/logs", get(chat_logs))
        .route("/api/analytics/summary", get(analytics_summary))
        .route("/api/analytics/dashboard", get(analytics_dashboard));

    if let Some(m) = state.metrics.as_ref() {
        router = router.merge(m.router());
    }

    if let Some(dir) = state.config.static_dir.as_ref() {
        let spa = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
        router = router.fallback_service(spa);
    }

    Ok(router
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .with_state(state))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "env": state.config.env.as_str() }))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(body) = payload.map_err(reject_body)?;
    let request = ChatRequest::from_json(&body).map_err(ApiError::BadRequest)?;
    let message_count = request.messages.len();

    let started = Instant::now();
    let outcome = match state.provider.complete(&request.prompt()).await {
        Ok(c) if c.reply.trim().is_empty() => Err(ChatError::EmptyReply),
        other => other,
    };
    let response_time_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(completion) => {
            state
                .analytics
                .record_turn(request.turn_metrics(&completion, response_time_ms));
            metrics::record_success(response_time_ms, completion.usage.as_ref());
            info!(
                provider = state.provider.name(),
                model = %completion.model,
                messages = message_count,
                response_time_ms,
                prompt_tokens = completion.usage.and_then(|u| u.prompt_tokens),
                completion_tokens = completion.usage.and_then(|u| u.completion_tokens),
                "chat turn completed"
            );
            append_log(
                &state.chat_log,
                ChatLogEntry::success(
                    Utc::now(),
                    message_count,
                    &completion.model,
                    completion.usage.as_ref(),
                ),
            )
            .await;

            Ok(Json(ChatResponse {
                reply: completion.reply.trim().to_string(),
                model: completion.model,
                usage: completion.usage,
            }))
        }
        Err(err) => {
            metrics::record_failure();
            warn!(
                provider = state.provider.name(),
                status = err.status().as_u16(),
                kind = err.kind(),
                messages = message_count,
                response_time_ms,
                "chat turn failed"
            );
            append_log(
                &state.chat_log,
                ChatLogEntry::failure(Utc::now(), message_count, &err),
            )
            .await;
            Err(err.into())
        }
    }
}

fn reject_body(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge;
    }
    ApiError::BadRequest(ValidationDetails::form(rejection.body_text()))
}

// Audit failures are reported but never change the response.
async fn append_log(store: &ChatLogStore, entry: ChatLogEntry) {
    if let Err(e) = store.append(entry).await {
        error!(error = ?e, path = %store.path().display(), "failed to persist chat log entry");
    }
}

async fn chat_logs(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Vec<ChatLogEntry>>, ApiError> {
    let limit = match q.get("limit").map(|s| s.trim()) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
            ApiError::BadRequest(ValidationDetails::form(
                "limit must be a non-negative integer",
            ))
        })?),
    };
    let entries = state.chat_log.recent(limit).await?;
    Ok(Json(entries))
}

async fn analytics_summary(State(state): State<AppState>) -> Json<DashboardReport> {
    Json(state.analytics.report())
}

async fn analytics_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardView>, ApiError> {
    let raw = serde_json::to_value(state.analytics.report())
        .context("serializing dashboard report")?;
    Ok(Json(normalize_dashboard(&raw)))
}
