//! OpenAI-compatible chat-completion wire types.
//!
//! The structures here are kept compatible with the OpenAI REST API so that
//! existing OpenAI SDK clients work without modification.

use serde::{Deserialize, Serialize};
use validator::Validate;

// ── Messages ─────────────────────────────────────────────────────────────────

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Any other role (`tool`, `developer`, ...). Accepted, then left out of
    /// the prompt.
    #[serde(other)]
    Other,
}

/// A single message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The content of the message.
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

// ── Chat Completions ─────────────────────────────────────────────────────────

/// Request body for `POST /v1/chat/completions`.
///
/// Sampling fields left out by the caller are filled from the process-wide
/// [`SamplingDefaults`](crate::dispatch::SamplingDefaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatCompletionRequest {
    /// Model identifier; echoed back in the response.
    ///
    /// Stricter than a plain string field: `""` fails validation.
    #[validate(length(min = 1, message = "model must not be empty"))]
    pub model: String,
    /// Conversation history in order.
    #[validate(length(min = 1, message = "messages must not be empty"))]
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; `0` selects greedy decoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, message = "temperature must be >= 0"))]
    pub temperature: Option<f64>,
    /// Nucleus sampling probability mass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "max_tokens must be positive"))]
    pub max_tokens: Option<u32>,
    /// When `true`, the response is framed as server-sent events.
    #[serde(default)]
    pub stream: bool,
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A single choice in the completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatChoice {
    /// Zero-based index of this choice.
    pub index: u32,
    /// The generated message.
    pub message: ChatMessage,
    /// Why generation stopped. Always `"stop"`.
    pub finish_reason: String,
}

/// Response body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatCompletionResponse {
    /// Unique identifier for this completion.
    pub id: String,
    /// Always `"chat.completion"`.
    pub object: String,
    /// Unix timestamp of when the response was created.
    pub created: i64,
    /// Model named by the request.
    pub model: String,
    /// Generated choices; exactly one.
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

// ── Streaming ────────────────────────────────────────────────────────────────

/// Incremental message content carried by a [`StreamChunk`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatDelta {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: String,
}

/// One `chat.completion.chunk` object of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StreamChunk {
    /// Same id as the completion it was derived from.
    pub id: String,
    /// Always `"chat.completion.chunk"`.
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults_optional_fields() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .expect("valid request");
        assert!(!req.stream);
        assert_eq!(req.temperature, None);
        assert_eq!(req.top_p, None);
        assert_eq!(req.max_tokens, None);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn unrecognised_roles_parse_as_other() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [
                {"role": "tool", "content": "x"},
                {"role": "developer", "content": "y"},
                {"role": "user", "content": "hi"}
            ],
        }))
        .expect("valid request");
        assert_eq!(req.messages[0].role, Role::Other);
        assert_eq!(req.messages[1].role, Role::Other);
        assert_eq!(req.messages[2].role, Role::User);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_model_fails_validation() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .expect("parses");
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("model"));
    }

    #[test]
    fn empty_messages_fail_validation() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [],
        }))
        .expect("parses");
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("messages"));
    }

    #[test]
    fn negative_temperature_and_zero_max_tokens_fail_validation() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": -0.5,
            "max_tokens": 0,
        }))
        .expect("parses");
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("temperature"));
        assert!(fields.contains_key("max_tokens"));
    }

    #[test]
    fn usage_total_is_sum() {
        let usage = Usage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }
}
