//! Cross-origin policy for browser-based clients.

use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::state::AppState;

/// Allow every method and header and expose every response header.
///
/// Origins are a wildcard unless `LMBRIDGE_CORS_ORIGINS` names at least one
/// parsable origin. Credentials are never allowed, since tower-http rejects
/// them combined with a wildcard.
pub fn cors_layer(state: Arc<AppState>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origins(state.config.cors_allowed_origins.as_deref()))
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

fn allowed_origins(list: Option<&str>) -> AllowOrigin {
    let Some(list) = list else {
        return AllowOrigin::any();
    };
    let origins: Vec<HeaderValue> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if origins.is_empty() {
        warn!(origins = %list, "no valid CORS origins configured; allowing any origin");
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    }
}
