//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use lmbridge_core::ChatDispatcher;

use crate::config::Config;

#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// The chat-completion pipeline bound to the loaded model.
    pub dispatcher: Arc<ChatDispatcher>,
}
