//! GGUF-quantized Llama-architecture engine built on candle.
//!
//! Both supported families (CodeLlama and DeepSeek Coder) use the Llama
//! architecture, so one `quantized_llama` runtime serves either. Weights and
//! `tokenizer.json` are resolved through the Hugging Face hub cache.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama::{self, ModelWeights};
use hf_hub::api::sync::{Api, ApiBuilder};
use strum::{Display, EnumString};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use super::{EngineError, InferenceEngine, Tokenize};
use crate::generation::GenerationConfig;

/// End-of-turn tokens used by the supported families besides the GGUF EOS.
const EXTRA_STOP_TOKENS: &[&str] = &["</s>", "<|EOT|>", "<｜end▁of▁sentence｜>"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

impl DeviceKind {
    fn open(self) -> Result<Device, EngineError> {
        // candle reports a missing cuda/metal build as an error here.
        Ok(match self {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => Device::new_cuda(0)?,
            DeviceKind::Metal => Device::new_metal(0)?,
        })
    }
}

/// Where to find the model and how to run it.
#[derive(Debug, Clone)]
pub struct ModelSource {
    /// Repository providing `tokenizer.json`.
    pub tokenizer_repo: String,
    pub gguf_repo: String,
    pub gguf_file: String,
    pub device: DeviceKind,
    /// Context window in tokens; prompts are left-truncated to fit.
    pub context_size: usize,
    pub hf_token: Option<String>,
}

// ── Tokenizer ─────────────────────────────────────────────────────────────────

pub struct CandleTokenizer {
    inner: Tokenizer,
    eos_token_id: Option<u32>,
}

impl CandleTokenizer {
    fn decode(&self, ids: &[u32]) -> Result<String, EngineError> {
        self.inner
            .decode(ids, true)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))
    }
}

impl Tokenize for CandleTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, EngineError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct CandleEngine {
    model: ModelWeights,
    tokenizer: Arc<CandleTokenizer>,
    device: Device,
    context_size: usize,
    stop_tokens: Vec<u32>,
}

impl CandleEngine {
    /// Download (or reuse from cache) and load the model described by `source`.
    ///
    /// Blocking; call from a blocking-capable thread.
    pub fn load(source: &ModelSource) -> Result<Self, EngineError> {
        let api = ApiBuilder::new()
            .with_token(source.hf_token.clone())
            .build()
            .map_err(|e| EngineError::Download {
                repo: source.gguf_repo.clone(),
                file: source.gguf_file.clone(),
                source: Box::new(e),
            })?;

        let weights_path = fetch(&api, &source.gguf_repo, &source.gguf_file)?;
        let tokenizer_path = fetch(&api, &source.tokenizer_repo, "tokenizer.json")?;
        let device = source.device.open()?;

        info!(path = %weights_path.display(), device = %source.device, "loading GGUF weights");
        let mut file = std::fs::File::open(&weights_path)?;
        let content = gguf_file::Content::read(&mut file)?;
        let gguf_eos = content
            .metadata
            .get("tokenizer.ggml.eos_token_id")
            .and_then(|v| v.to_u32().ok());
        let model = ModelWeights::from_gguf(content, &mut file, &device)?;

        let inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))?;

        let mut stop_tokens: Vec<u32> = gguf_eos.into_iter().collect();
        for token in EXTRA_STOP_TOKENS {
            if let Some(id) = inner.token_to_id(token) {
                if !stop_tokens.contains(&id) {
                    stop_tokens.push(id);
                }
            }
        }
        let eos_token_id = stop_tokens.first().copied();

        let context_size = source.context_size.clamp(2, quantized_llama::MAX_SEQ_LEN);
        if context_size != source.context_size {
            warn!(
                requested = source.context_size,
                effective = context_size,
                "context size clamped to what the runtime supports"
            );
        }

        info!(?eos_token_id, stop_tokens = ?stop_tokens, context_size, "model loaded");
        Ok(Self {
            model,
            tokenizer: Arc::new(CandleTokenizer {
                inner,
                eos_token_id,
            }),
            device,
            context_size,
            stop_tokens,
        })
    }

    fn is_stop(&self, token: u32, pad_token_id: Option<u32>) -> bool {
        self.stop_tokens.contains(&token) || pad_token_id == Some(token)
    }

    fn next_logits(&mut self, tokens: &[u32], index_pos: usize) -> Result<Tensor, EngineError> {
        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        Ok(self.model.forward(&input, index_pos)?.squeeze(0)?)
    }
}

fn fetch(api: &Api, repo: &str, file: &str) -> Result<PathBuf, EngineError> {
    api.model(repo.to_owned())
        .get(file)
        .map_err(|e| EngineError::Download {
            repo: repo.to_owned(),
            file: file.to_owned(),
            source: Box::new(e),
        })
}

/// Map the generation config onto candle's sampler.
fn sampling(config: &GenerationConfig) -> Result<Sampling, EngineError> {
    if !config.do_sample {
        return Ok(Sampling::ArgMax);
    }
    let temperature = config.temperature.unwrap_or(1.0);
    if !(temperature > 0.0 && temperature.is_finite()) {
        return Err(EngineError::InvalidSampling(format!(
            "temperature must be a positive number, got {temperature}"
        )));
    }
    match config.top_p {
        Some(p) if !(p > 0.0 && p <= 1.0) => Err(EngineError::InvalidSampling(format!(
            "top_p must be in (0, 1], got {p}"
        ))),
        Some(p) if p < 1.0 => Ok(Sampling::TopP { p, temperature }),
        _ => Ok(Sampling::All { temperature }),
    }
}

fn seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(299_792_458)
}

impl InferenceEngine for CandleEngine {
    fn tokenizer(&self) -> Arc<dyn Tokenize> {
        Arc::clone(&self.tokenizer) as Arc<dyn Tokenize>
    }

    fn generate(&mut self, prompt: &str, config: &GenerationConfig) -> Result<String, EngineError> {
        let mut processor = LogitsProcessor::from_sampling(seed(), sampling(config)?);

        let max_new_tokens = config.max_new_tokens.min(self.context_size - 1);
        let mut tokens = self.tokenizer.encode(prompt)?;
        let budget = self.context_size - max_new_tokens;
        if tokens.len() > budget {
            let dropped = tokens.len() - budget;
            warn!(dropped, budget, "prompt exceeds context window; truncating from the left");
            tokens.drain(..dropped);
        }

        if max_new_tokens == 0 {
            return Ok(String::new());
        }
        let mut generated: Vec<u32> = Vec::with_capacity(max_new_tokens);

        // Position 0 resets the model's KV cache, so every call starts fresh.
        let logits = self.next_logits(&tokens, 0)?;
        let mut next = processor.sample(&logits)?;
        let mut index_pos = tokens.len();

        while !self.is_stop(next, config.pad_token_id) {
            generated.push(next);
            if generated.len() >= max_new_tokens {
                break;
            }
            let logits = self.next_logits(&[next], index_pos)?;
            index_pos += 1;
            next = processor.sample(&logits)?;
        }

        self.tokenizer.decode(&generated)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn greedy_config_uses_argmax() {
        let config = GenerationConfig::new(8, 0.0, 0.95, None);
        assert!(matches!(sampling(&config), Ok(Sampling::ArgMax)));
    }

    #[test]
    fn sampled_config_uses_top_p_below_one() {
        let config = GenerationConfig::new(8, 0.7, 0.9, None);
        assert!(matches!(
            sampling(&config),
            Ok(Sampling::TopP { p, temperature }) if p == 0.9 && temperature == 0.7
        ));

        let config = GenerationConfig::new(8, 0.7, 1.0, None);
        assert!(matches!(sampling(&config), Ok(Sampling::All { .. })));
    }

    #[test]
    fn out_of_range_top_p_is_rejected_by_engine() {
        let config = GenerationConfig::new(8, 0.7, 1.5, None);
        assert!(matches!(
            sampling(&config),
            Err(EngineError::InvalidSampling(_))
        ));
    }

    #[test]
    fn device_kind_parses() {
        assert_eq!("CUDA".parse::<DeviceKind>().ok(), Some(DeviceKind::Cuda));
        assert_eq!(DeviceKind::default(), DeviceKind::Cpu);
    }
}
