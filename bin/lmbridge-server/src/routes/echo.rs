//! Debug aid that reflects the parsed request body.

use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{Value, json};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(echo))]
pub struct EchoApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/echo", post(echo))
}

/// Return the request body under `{"echo": ...}`.
#[utoipa::path(
    post,
    path = "/echo",
    tag = "debug",
    request_body = Value,
    responses(
        (status = 200, description = "Parsed body echoed back", body = Value),
        (status = 500, description = "Body is not valid JSON"),
    )
)]
pub async fn echo(
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ServerError> {
    let value: Value = serde_json::from_slice(&body?)?;
    Ok(Json(json!({ "echo": value })))
}
