//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`]. All failures, including malformed
//! request bodies, are reported as HTTP 500 with `{"detail": "<message>"}`
//! so OpenAI-style clients see a single error shape.

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lmbridge_core::{DispatchError, Stage};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// A chat completion failed somewhere in the pipeline.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A body could not be parsed, or a response could not be serialized.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The request body could not be read, e.g. it exceeds the size limit.
    #[error("failed to read request body: {0}")]
    Body(String),
}

impl ServerError {
    fn stage(&self) -> Stage {
        match self {
            ServerError::Dispatch(e) => e.stage(),
            ServerError::Json(_) | ServerError::Body(_) => Stage::Received,
        }
    }
}

impl From<BytesRejection> for ServerError {
    fn from(rejection: BytesRejection) -> Self {
        ServerError::Body(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        error!(
            stage = %self.stage(),
            failed = %Stage::Failed,
            error = %detail,
            "request failed"
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": detail })),
        )
            .into_response()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
