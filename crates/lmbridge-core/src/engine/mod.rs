//! The seam between the protocol layer and the model runtime.
//!
//! An [`InferenceEngine`] owns the loaded weights and is driven by exactly one
//! thread at a time (`generate` takes `&mut self`). Its tokenizer is split out
//! behind [`Tokenize`] so token counting can run on any request task without
//! going through the generation queue.

#[cfg(feature = "candle")]
pub mod candle;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::sync::Arc;

use thiserror::Error;

use crate::generation::GenerationConfig;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Failed to fetch {file} from {repo}")]
    Download {
        repo: String,
        file: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[cfg(feature = "candle")]
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Invalid sampling parameters: {0}")]
    InvalidSampling(String),

    #[error("Invalid generation queue capacity: {0} (must be > 0)")]
    InvalidQueueCapacity(usize),

    #[error("Failed to spawn generation worker thread")]
    SpawnWorker {
        #[source]
        source: std::io::Error,
    },

    #[error("Generation worker shut down unexpectedly")]
    WorkerShutdown,

    #[error("Generation failed: {0}")]
    Generation(String),
}

/// Text → token ids, shared read-only across request tasks.
pub trait Tokenize: Send + Sync {
    /// Encode `text`, including the special tokens the tokenizer adds by default.
    fn encode(&self, text: &str) -> Result<Vec<u32>, EngineError>;

    /// End-of-sequence id, used as the padding id during generation.
    fn eos_token_id(&self) -> Option<u32>;
}

/// A loaded causal language model.
pub trait InferenceEngine: Send + 'static {
    fn tokenizer(&self) -> Arc<dyn Tokenize>;

    /// Generate a continuation of `prompt`.
    ///
    /// Returns only the newly generated text; the prompt is never echoed.
    fn generate(&mut self, prompt: &str, config: &GenerationConfig) -> Result<String, EngineError>;
}
