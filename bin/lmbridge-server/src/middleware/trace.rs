use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, HttpBody};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, Limited};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::error::ServerError;
use crate::state::AppState;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Largest JSON request body written to the log verbatim.
const MAX_LOGGED_BODY: u64 = 1024;

pub async fn trace_middleware(
    State(_state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();

    // Reuse the caller's trace id when it is a valid UUID.
    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    async move {
        info!("→ request started");
        let mut response = match log_body(req).await {
            Ok(mut req) => {
                if let Some(value) = &trace_header {
                    req.headers_mut().insert(X_TRACE_ID, value.clone());
                }
                // Response bodies pass through untouched so event streams
                // are not buffered.
                next.run(req).await
            }
            Err(e) => e.into_response(),
        };
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Log the request body when it is small JSON of known length.
///
/// Every other body is forwarded unread, so the handler's own body limit
/// still applies to it.
async fn log_body(req: Request<Body>) -> Result<Request<Body>, ServerError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_owned();
    let size = req.body().size_hint().exact();

    let loggable = content_type.contains("application/json")
        && size.is_some_and(|n| n < MAX_LOGGED_BODY);
    if !loggable {
        if let Some(size) = size.filter(|n| *n > 0) {
            info!(content_type, size, "request body skipped");
        }
        return Ok(req);
    }

    let (parts, body) = req.into_parts();
    let bytes = Limited::new(body, MAX_LOGGED_BODY as usize)
        .collect()
        .await
        .map_err(|e| ServerError::Body(e.to_string()))?
        .to_bytes();
    if let Ok(text) = std::str::from_utf8(&bytes) {
        info!(body = %text, "request body");
    }
    Ok(Request::from_parts(parts, Body::from(bytes)))
}
