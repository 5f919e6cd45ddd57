//! Generation invoker.
//!
//! The loaded model is a single non-reentrant resource. [`GenerationInvoker`]
//! moves the engine onto a dedicated OS thread and feeds it through a bounded
//! queue, so generation calls from concurrent requests run strictly one after
//! another. Calls are neither cancellable nor timed out once queued.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::engine::{EngineError, InferenceEngine, Tokenize};

/// Sampling configuration for one generation call.
///
/// `temperature` and `top_p` are present only when sampling is enabled; some
/// engines reject them for greedy decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    pub pad_token_id: Option<u32>,
}

impl GenerationConfig {
    /// Derive the config; `temperature > 0` enables sampling and passes both
    /// `temperature` and `top_p` through unchanged.
    pub fn new(
        max_new_tokens: usize,
        temperature: f64,
        top_p: f64,
        pad_token_id: Option<u32>,
    ) -> Self {
        let do_sample = temperature > 0.0;
        Self {
            max_new_tokens,
            do_sample,
            temperature: do_sample.then_some(temperature),
            top_p: do_sample.then_some(top_p),
            pad_token_id,
        }
    }
}

// ── Worker protocol ───────────────────────────────────────────────────────────

enum WorkerCommand {
    Generate {
        prompt: String,
        config: GenerationConfig,
        reply_tx: oneshot::Sender<Result<String, EngineError>>,
    },
}

// ── Invoker ───────────────────────────────────────────────────────────────────

/// Cloneable handle to the generation worker.
#[derive(Clone)]
pub struct GenerationInvoker {
    cmd_tx: mpsc::Sender<WorkerCommand>,
    tokenizer: Arc<dyn Tokenize>,
}

impl std::fmt::Debug for GenerationInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationInvoker")
            .field("queued", &(self.cmd_tx.max_capacity() - self.cmd_tx.capacity()))
            .finish()
    }
}

impl GenerationInvoker {
    /// Move `engine` onto the `generation-worker` thread.
    ///
    /// `capacity` bounds the number of generation requests waiting in line.
    pub fn spawn<E: InferenceEngine>(engine: E, capacity: usize) -> Result<Self, EngineError> {
        if capacity == 0 {
            return Err(EngineError::InvalidQueueCapacity(capacity));
        }

        let tokenizer = engine.tokenizer();
        let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>(capacity);

        std::thread::Builder::new()
            .name("generation-worker".into())
            .spawn(move || run_worker(engine, cmd_rx))
            .map_err(|source| EngineError::SpawnWorker { source })?;

        info!(capacity, "generation worker started");
        Ok(Self { cmd_tx, tokenizer })
    }

    /// Tokenizer of the engine owned by the worker.
    pub fn tokenizer(&self) -> Arc<dyn Tokenize> {
        Arc::clone(&self.tokenizer)
    }

    /// Queue one generation and wait for its result.
    pub async fn generate(
        &self,
        prompt: String,
        config: GenerationConfig,
    ) -> Result<String, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(WorkerCommand::Generate {
                prompt,
                config,
                reply_tx,
            })
            .await
            .map_err(|_| EngineError::WorkerShutdown)?;
        reply_rx.await.map_err(|_| EngineError::WorkerShutdown)?
    }
}

fn run_worker<E: InferenceEngine>(mut engine: E, mut cmd_rx: mpsc::Receiver<WorkerCommand>) {
    while let Some(cmd) = cmd_rx.blocking_recv() {
        match cmd {
            WorkerCommand::Generate {
                prompt,
                config,
                reply_tx,
            } => {
                debug!(config = ?config, prompt_len = prompt.len(), "generating");
                // A panic fails this request only; the worker keeps serving.
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    engine.generate(&prompt, &config)
                }))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    error!(panic = %message, "engine panicked during generation");
                    Err(EngineError::Generation(format!("engine panicked: {message}")))
                });
                // The requester may have gone away; the result is dropped then.
                let _ = reply_tx.send(result);
            }
        }
    }
    debug!("generation worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::testing::ScriptedEngine;
    use std::time::Duration;

    #[test]
    fn zero_temperature_omits_sampling_fields() {
        let config = GenerationConfig::new(64, 0.0, 0.95, Some(2));
        assert!(!config.do_sample);
        assert_eq!(config.temperature, None);
        assert_eq!(config.top_p, None);

        let json = serde_json::to_value(&config).expect("serializes");
        assert!(json.get("temperature").is_none());
        assert!(json.get("top_p").is_none());
        assert_eq!(json["pad_token_id"], 2);
    }

    #[test]
    fn positive_temperature_passes_both_through_unchanged() {
        let config = GenerationConfig::new(64, 1.7, 1.5, None);
        assert!(config.do_sample);
        assert_eq!(config.temperature, Some(1.7));
        assert_eq!(config.top_p, Some(1.5));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = GenerationInvoker::spawn(ScriptedEngine::replying("x"), 0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidQueueCapacity(0)));
    }

    #[tokio::test]
    async fn generate_round_trips_through_worker() {
        let engine = ScriptedEngine::replying("fn main() {}");
        let probe = engine.probe();
        let invoker = GenerationInvoker::spawn(engine, 4).expect("spawn");

        let config = GenerationConfig::new(8, 0.0, 1.0, Some(2));
        let text = invoker
            .generate("prompt".into(), config.clone())
            .await
            .expect("generate");

        assert_eq!(text, "fn main() {}");
        assert_eq!(probe.calls(), vec![("prompt".to_owned(), config)]);
    }

    #[tokio::test]
    async fn engine_failure_propagates() {
        let invoker =
            GenerationInvoker::spawn(ScriptedEngine::failing("out of memory"), 4).expect("spawn");
        let err = invoker
            .generate("p".into(), GenerationConfig::new(8, 0.0, 1.0, None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out of memory"));
    }

    #[tokio::test]
    async fn engine_panic_fails_one_call_and_worker_survives() {
        let engine = ScriptedEngine::replying("fine").panicking_once("kv cache corrupted");
        let invoker = GenerationInvoker::spawn(engine, 4).expect("spawn");
        let config = GenerationConfig::new(8, 0.0, 1.0, None);

        let err = invoker
            .generate("first".into(), config.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Generation(_)));
        assert!(err.to_string().contains("kv cache corrupted"));

        let text = invoker
            .generate("second".into(), config)
            .await
            .expect("worker still serving");
        assert_eq!(text, "fine");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_are_serialized() {
        let engine = ScriptedEngine::replying("ok").with_delay(Duration::from_millis(20));
        let probe = engine.probe();
        let invoker = GenerationInvoker::spawn(engine, 8).expect("spawn");

        let mut handles = Vec::new();
        for i in 0..6 {
            let invoker = invoker.clone();
            handles.push(tokio::spawn(async move {
                invoker
                    .generate(format!("p{i}"), GenerationConfig::new(4, 0.5, 0.9, None))
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.expect("join").expect("generate"), "ok");
        }

        assert_eq!(probe.calls().len(), 6);
        assert!(!probe.overlapped(), "generate calls overlapped");
    }
}
