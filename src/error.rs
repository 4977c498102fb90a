// src/error.rs
//! Request-path error types and their HTTP mapping.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

pub const EMPTY_REPLY_MESSAGE: &str = "The assistant returned an empty response. Please try again.";
pub const INVALID_BODY_MESSAGE: &str = "Invalid request body.";

/// Failure of a chat-completion call.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The provider answered with a non-2xx status.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, connect, timeout).
    #[error("connection error: {message}")]
    Transport { message: String, timed_out: bool },

    /// The provider answered but the reply was blank.
    #[error("{}", EMPTY_REPLY_MESSAGE)]
    EmptyReply,

    /// The provider answered 2xx with a body we could not decode.
    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),
}

impl ChatError {
    /// Error class name reported to clients as `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Upstream { status, .. } => match status {
                400 => "BadRequestError",
                401 => "AuthenticationError",
                403 => "PermissionDeniedError",
                404 => "NotFoundError",
                409 => "ConflictError",
                422 => "UnprocessableEntityError",
                429 => "RateLimitError",
                s if *s >= 500 => "InternalServerError",
                _ => "APIError",
            },
            ChatError::Transport { timed_out: true, .. } => "APIConnectionTimeoutError",
            ChatError::Transport { .. } => "APIConnectionError",
            ChatError::EmptyReply => "EmptyReplyError",
            ChatError::InvalidResponse(_) => "APIError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ChatError::InvalidResponse(err.to_string())
        } else {
            ChatError::Transport {
                message: err.to_string(),
                timed_out: err.is_timeout(),
            }
        }
    }
}

/// Flattened validation failures, keyed like the client-side form library expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDetails {
    pub form_errors: Vec<String>,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationDetails {
    pub fn form(message: impl Into<String>) -> Self {
        Self {
            form_errors: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn push_field(&mut self, field: &str, message: impl Into<String>) {
        self.field_errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{}", INVALID_BODY_MESSAGE)]
    BadRequest(ValidationDetails),

    #[error("request body exceeds the size limit")]
    PayloadTooLarge,

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": INVALID_BODY_MESSAGE, "details": details })),
            )
                .into_response(),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "Request body is too large." })),
            )
                .into_response(),
            ApiError::Chat(ChatError::EmptyReply) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": EMPTY_REPLY_MESSAGE })),
            )
                .into_response(),
            ApiError::Chat(err) => (
                err.status(),
                Json(json!({ "error": err.to_string(), "type": err.kind() })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "unhandled request error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
