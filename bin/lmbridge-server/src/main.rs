//! lmbridge-server – entry point.
//!
//! Startup order:
//! 1. Parse the command line and configuration from environment variables.
//! 2. Initialise structured tracing (JSON or human-readable).
//! 3. Download (or reuse from cache) and load the model.
//! 4. Start the generation worker and build the chat dispatcher.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.

mod cli;
mod config;
mod error;
mod middleware;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lmbridge_core::engine::candle::CandleEngine;
use lmbridge_core::{ChatDispatcher, GenerationInvoker};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cli = Cli::parse();
    let cfg = Config::from_env().with_cli(&cli);

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: LMBRIDGE_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        family = %cfg.family,
        model = %cfg.model_name(),
        quantization = %cfg.quantization,
        "lmbridge-server starting"
    );

    // ── 3. Model ───────────────────────────────────────────────────────────────
    let source = cfg.model_source();
    let engine = tokio::task::spawn_blocking(move || CandleEngine::load(&source))
        .await
        .context("model loading task panicked")?
        .context("failed to load model")?;

    // ── 4. Generation worker + dispatcher ──────────────────────────────────────
    let invoker = GenerationInvoker::spawn(engine, cfg.queue_capacity)?;
    let dispatcher = ChatDispatcher::new(cfg.family.template(), cfg.sampling_defaults(), invoker);
    info!(template = %dispatcher.template(), defaults = ?cfg.sampling_defaults(), "model ready");

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        dispatcher: Arc::new(dispatcher),
    });

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cfg.host, cfg.port))?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("lmbridge-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
