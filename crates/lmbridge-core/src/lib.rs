//! lmbridge-core – protocol translation between OpenAI chat completions and a
//! locally loaded causal language model.
//!
//! The pipeline for a single request is:
//!
//! 1. [`dispatch::ChatDispatcher`] parses and validates the request body.
//! 2. [`prompt::TemplateVariant`] renders the conversation into one prompt.
//! 3. [`tokenizer::TokenCounter`] counts prompt tokens.
//! 4. [`generation::GenerationInvoker`] runs the engine on its worker thread.
//! 5. [`assembler`] builds the completion object or the SSE frames.

pub mod assembler;
pub mod dispatch;
pub mod engine;
pub mod family;
pub mod generation;
pub mod prompt;
pub mod tokenizer;
pub mod types;

pub use dispatch::{ChatDispatcher, Completion, DispatchError, SamplingDefaults, Stage};
pub use engine::{EngineError, InferenceEngine, Tokenize};
pub use family::{ModelFamily, Quantization};
pub use generation::{GenerationConfig, GenerationInvoker};
pub use prompt::TemplateVariant;
pub use tokenizer::TokenCounter;
