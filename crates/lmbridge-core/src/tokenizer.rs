//! Token counting for usage accounting.

use std::sync::Arc;

use tracing::warn;

use crate::engine::Tokenize;

/// Counts tokens for the `usage` block of a completion.
///
/// Counting never fails: a tokenizer error is logged and reported as zero
/// tokens, so a broken count never fails the request it belongs to.
#[derive(Clone)]
pub struct TokenCounter {
    tokenizer: Arc<dyn Tokenize>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("eos_token_id", &self.tokenizer.eos_token_id())
            .finish()
    }
}

impl TokenCounter {
    pub fn new(tokenizer: Arc<dyn Tokenize>) -> Self {
        Self { tokenizer }
    }

    pub fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text) {
            Ok(ids) => ids.len(),
            Err(e) => {
                warn!(error = %e, text_len = text.len(), "token count failed; reporting 0");
                0
            }
        }
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.tokenizer.eos_token_id()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
