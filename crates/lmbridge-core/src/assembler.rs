//! Response assembly: the synchronous completion object and its SSE framing.
//!
//! Streaming is a framing format only. Generation has already finished when
//! the frames are built, so a streamed response is exactly one chunk carrying
//! the whole completion followed by the `[DONE]` sentinel.

use chrono::Utc;
use uuid::Uuid;

use crate::types::{
    ChatChoice, ChatCompletionResponse, ChatDelta, ChatMessage, ChunkChoice, Role, StreamChunk,
    Usage,
};

pub const FINISH_REASON_STOP: &str = "stop";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Build the single-choice completion for `generated` text.
pub fn completion(model: &str, generated: &str, usage: Usage) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion".into(),
        created: Utc::now().timestamp(),
        model: model.to_owned(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::new(Role::Assistant, generated.trim()),
            finish_reason: FINISH_REASON_STOP.into(),
        }],
        usage,
    }
}

/// Repackage a finished completion as one `chat.completion.chunk`.
pub fn chunk(response: &ChatCompletionResponse) -> StreamChunk {
    let content = response
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .unwrap_or_default();

    StreamChunk {
        id: response.id.clone(),
        object: "chat.completion.chunk".into(),
        created: response.created,
        model: response.model.clone(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChatDelta {
                role: Role::Assistant,
                content,
            },
            finish_reason: FINISH_REASON_STOP.into(),
        }],
    }
}

/// One server-sent event of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Chunk(StreamChunk),
    Done,
}

impl StreamFrame {
    /// Event payload, i.e. the text after `data: `.
    pub fn data(&self) -> Result<String, serde_json::Error> {
        match self {
            StreamFrame::Chunk(chunk) => serde_json::to_string(chunk),
            StreamFrame::Done => Ok(DONE_SENTINEL.to_owned()),
        }
    }

    /// The complete wire form, `data: <payload>\n\n`.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", self.data()?))
    }
}

/// The two frames of a streamed completion.
pub fn stream_frames(response: &ChatCompletionResponse) -> [StreamFrame; 2] {
    [StreamFrame::Chunk(chunk(response)), StreamFrame::Done]
}

// ── Tests ──────────────────────────────────────────────────────────────────────
