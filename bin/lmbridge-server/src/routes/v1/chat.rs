//! OpenAI-compatible chat-completion routes.
//!
//! The handler passes the raw body to [`lmbridge_core::ChatDispatcher`] so
//! malformed JSON is reported through the same `{"detail": ...}` error as
//! every other failure. Streamed responses are framed after generation has
//! finished: one chunk with the full text, then `[DONE]`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use lmbridge_core::Stage;
use lmbridge_core::assembler;
use lmbridge_core::types::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatDelta, ChatMessage,
    ChunkChoice, Role, StreamChunk, Usage,
};
use serde_json::{Value, json};
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(chat_completions, chat_completions_preflight),
    components(schemas(
        ChatCompletionRequest,
        ChatCompletionResponse,
        ChatMessage,
        ChatChoice,
        Role,
        Usage,
        StreamChunk,
        ChunkChoice,
        ChatDelta
    ))
)]
pub struct ChatApi;

/// Register chat-completion routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/chat/completions",
        post(chat_completions).options(chat_completions_preflight),
    )
}

// ── Chat completions ──────────────────────────────────────────────────────────

/// OpenAI chat completions (`POST /v1/chat/completions`).
///
/// With `stream: true` the response is `text/event-stream` carrying exactly
/// two events: one `chat.completion.chunk` holding the whole completion,
/// then `data: [DONE]`.
#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    tag = "chat",
    request_body = ChatCompletionRequest,
    responses(
        (status = 200, description = "Completion generated", body = ChatCompletionResponse),
        (status = 500, description = "Invalid request or inference failure", body = Value),
    )
)]
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ServerError> {
    let body = body?;
    let completion = state.dispatcher.dispatch(&body).await?;

    let response = if completion.stream {
        event_stream(&completion.response)?
    } else {
        Json(completion.response).into_response()
    };
    debug!(stage = %Stage::Sent, "response sent");
    Ok(response)
}

/// CORS preflight; the CORS layer adds the access-control headers.
#[utoipa::path(
    options,
    path = "/v1/chat/completions",
    tag = "chat",
    responses(
        (status = 200, description = "Preflight accepted", body = Value)
    )
)]
pub async fn chat_completions_preflight() -> Json<Value> {
    Json(json!({}))
}

/// Frame a finished completion as server-sent events.
fn event_stream(response: &ChatCompletionResponse) -> Result<Response, ServerError> {
    let events = assembler::stream_frames(response)
        .iter()
        .map(|frame| frame.data().map(|data| Event::default().data(data)))
        .collect::<Result<Vec<Event>, _>>()?;
    debug!(id = %response.id, frames = events.len(), "streaming completion");

    let stream = futures::stream::iter(events.into_iter().map(Ok::<Event, Infallible>));
    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream),
    )
        .into_response())
}
