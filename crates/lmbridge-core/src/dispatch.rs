//! Request dispatcher.
//!
//! Drives one chat completion through
//! `Received → Validated → PromptBuilt → Generated → Assembled`; any step may
//! end in `Failed`, which is reported as a [`DispatchError`]. Sending the
//! result (JSON or SSE) is left to the transport.

use strum::Display;
use thiserror::Error;
use tracing::{debug, info};
use validator::Validate;

use crate::assembler;
use crate::engine::EngineError;
use crate::generation::{GenerationConfig, GenerationInvoker};
use crate::prompt::TemplateVariant;
use crate::tokenizer::TokenCounter;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, Usage};

/// Lifecycle stage of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Received,
    Validated,
    PromptBuilt,
    Generated,
    Assembled,
    Sent,
    Failed,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Inference(#[from] EngineError),
}

impl DispatchError {
    /// The last stage the request reached before failing.
    pub fn stage(&self) -> Stage {
        match self {
            DispatchError::MalformedBody(_) | DispatchError::Validation(_) => Stage::Received,
            DispatchError::Inference(_) => Stage::PromptBuilt,
        }
    }

    /// `true` when the caller sent a bad request rather than the model failing.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DispatchError::MalformedBody(_) | DispatchError::Validation(_)
        )
    }
}

/// Process-wide sampling defaults applied to fields the request leaves out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingDefaults {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
            top_p: 0.95,
        }
    }
}

/// A finished completion plus the framing the caller asked for.
#[derive(Debug, Clone)]
pub struct Completion {
    pub stream: bool,
    pub response: ChatCompletionResponse,
}

#[derive(Debug, Clone)]
pub struct ChatDispatcher {
    template: TemplateVariant,
    defaults: SamplingDefaults,
    counter: TokenCounter,
    invoker: GenerationInvoker,
}

impl ChatDispatcher {
    pub fn new(
        template: TemplateVariant,
        defaults: SamplingDefaults,
        invoker: GenerationInvoker,
    ) -> Self {
        Self {
            template,
            defaults,
            counter: TokenCounter::new(invoker.tokenizer()),
            invoker,
        }
    }

    pub fn template(&self) -> TemplateVariant {
        self.template
    }

    /// `Received → Validated`.
    pub fn parse(&self, body: &[u8]) -> Result<ChatCompletionRequest, DispatchError> {
        debug!(body = %String::from_utf8_lossy(body), "raw chat completion request");
        let request: ChatCompletionRequest = serde_json::from_slice(body)?;
        request.validate()?;
        debug!(stage = %Stage::Validated, messages = request.messages.len(), "request validated");
        Ok(request)
    }

    /// Sampling configuration for `request`, with defaults filled in.
    pub fn generation_config(&self, request: &ChatCompletionRequest) -> GenerationConfig {
        GenerationConfig::new(
            request.max_tokens.unwrap_or(self.defaults.max_tokens) as usize,
            request.temperature.unwrap_or(self.defaults.temperature),
            request.top_p.unwrap_or(self.defaults.top_p),
            self.counter.eos_token_id(),
        )
    }

    /// `Validated → PromptBuilt → Generated → Assembled`.
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, DispatchError> {
        let prompt = self.template.render(&request.messages);
        let prompt_tokens = self.counter.count(&prompt);
        debug!(stage = %Stage::PromptBuilt, prompt_tokens, "prompt built");

        let config = self.generation_config(request);
        info!(
            model = %request.model,
            messages = request.messages.len(),
            config = ?config,
            "generating completion"
        );
        let generated = self.invoker.generate(prompt, config).await?;

        let completion_tokens = self.counter.count(&generated);
        debug!(stage = %Stage::Generated, completion_tokens, "completion generated");

        let response = assembler::completion(
            &request.model,
            &generated,
            Usage::new(prompt_tokens, completion_tokens),
        );
        debug!(stage = %Stage::Assembled, id = %response.id, "response assembled");
        Ok(response)
    }

    /// Run the whole pipeline for a raw request body.
    pub async fn dispatch(&self, body: &[u8]) -> Result<Completion, DispatchError> {
        let request = self.parse(body)?;
        let response = self.complete(&request).await?;
        info!(
            id = %response.id,
            stream = request.stream,
            total_tokens = response.usage.total_tokens,
            "chat completion done"
        );
        Ok(Completion {
            stream: request.stream,
            response,
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
