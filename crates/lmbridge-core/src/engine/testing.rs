//! Deterministic in-process engine for tests.
//!
//! [`ScriptedEngine`] replies with a fixed completion and records every
//! prompt/config pair it was asked to generate for. It also tracks whether two
//! `generate` calls ever overlapped.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{EngineError, InferenceEngine, Tokenize};
use crate::generation::GenerationConfig;

/// End-of-sequence id reported by [`WhitespaceTokenizer`].
pub const TEST_EOS_TOKEN_ID: u32 = 2;

/// Counts one token per whitespace-separated word, plus one for BOS.
///
/// Text containing `"\u{0}"` fails to encode, to exercise the fallback path.
#[derive(Debug, Default)]
pub struct WhitespaceTokenizer;

impl Tokenize for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, EngineError> {
        if text.contains('\u{0}') {
            return Err(EngineError::Tokenizer("NUL byte in input".into()));
        }
        let words = text.split_whitespace().count() as u32;
        Ok(std::iter::once(1).chain(3..3 + words).collect())
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(TEST_EOS_TOKEN_ID)
    }
}

/// Everything observed by a [`ScriptedEngine`], shared with the test body.
#[derive(Debug, Default)]
pub struct EngineProbe {
    calls: Mutex<Vec<(String, GenerationConfig)>>,
    active: AtomicUsize,
    overlapped: AtomicBool,
}

impl EngineProbe {
    pub fn calls(&self) -> Vec<(String, GenerationConfig)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// `true` if a `generate` call started while another was still running.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ScriptedEngine {
    reply: Result<String, String>,
    panic_next: Option<String>,
    delay: Duration,
    probe: Arc<EngineProbe>,
}

impl ScriptedEngine {
    /// An engine that always generates `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            panic_next: None,
            delay: Duration::ZERO,
            probe: Arc::new(EngineProbe::default()),
        }
    }

    /// An engine whose every `generate` call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            ..Self::replying("")
        }
    }

    /// Panic with `message` on the first `generate` call, then behave normally.
    pub fn panicking_once(mut self, message: impl Into<String>) -> Self {
        self.panic_next = Some(message.into());
        self
    }

    /// Hold each `generate` call for `delay` so overlaps become observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn probe(&self) -> Arc<EngineProbe> {
        Arc::clone(&self.probe)
    }
}

impl InferenceEngine for ScriptedEngine {
    fn tokenizer(&self) -> Arc<dyn Tokenize> {
        Arc::new(WhitespaceTokenizer)
    }

    fn generate(&mut self, prompt: &str, config: &GenerationConfig) -> Result<String, EngineError> {
        if let Some(message) = self.panic_next.take() {
            panic!("{message}");
        }
        if self.probe.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.probe.overlapped.store(true, Ordering::SeqCst);
        }
        if let Ok(mut calls) = self.probe.calls.lock() {
            calls.push((prompt.to_owned(), config.clone()));
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.probe.active.fetch_sub(1, Ordering::SeqCst);

        self.reply.clone().map_err(EngineError::Generation)
    }
}
