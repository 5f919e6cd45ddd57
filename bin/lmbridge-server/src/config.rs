//! Server configuration, loaded from environment variables at startup.

use lmbridge_core::engine::candle::{ModelSource, DeviceKind};
use lmbridge_core::{ModelFamily, Quantization, SamplingDefaults};

use crate::cli::Cli;

/// Runtime configuration for lmbridge-server.
///
/// Every field has a default so the server starts without any environment
/// variables set. Fields left as `None` fall back to the model family preset,
/// which is why they are resolved through accessors rather than read directly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which model family to serve; selects the prompt template.
    pub family: ModelFamily,
    /// Model identifier reported in banners and used as the tokenizer repo.
    pub model_name: Option<String>,
    pub quantization: Quantization,
    pub gguf_repo: Option<String>,
    pub gguf_file: Option<String>,
    pub device: DeviceKind,

    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub top_p: f64,
    /// Engine context window in tokens.
    pub context_size: usize,

    /// Hugging Face token for gated downloads.
    pub hf_token: Option<String>,

    pub host: String,
    pub port: u16,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,
    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
    /// Mount the Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,
    /// Comma-separated CORS origin allow-list; wildcard when unset.
    pub cors_allowed_origins: Option<String>,

    /// Bound of the generation request queue.
    pub queue_capacity: usize,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = &lookup;
        Self {
            family: parse_env(lookup, "MODEL_FAMILY", ModelFamily::default()),
            model_name: non_empty(lookup, "MODEL_NAME"),
            quantization: parse_env(lookup, "MODEL_QUANTIZE", Quantization::default()),
            gguf_repo: non_empty(lookup, "MODEL_GGUF_REPO"),
            gguf_file: non_empty(lookup, "MODEL_GGUF_FILE"),
            device: parse_env(lookup, "MODEL_DEVICE", DeviceKind::default()),
            max_tokens: parse_env(lookup, "DEFAULT_MAX_TOKENS", 1024),
            temperature: non_empty(lookup, "DEFAULT_TEMPERATURE").and_then(|v| v.parse().ok()),
            top_p: parse_env(lookup, "DEFAULT_TOP_P", 0.95),
            context_size: parse_env(lookup, "DEFAULT_NUM_CTX", 6144),
            hf_token: non_empty(lookup, "HUGGINGFACE_API_KEY"),
            host: env_or(lookup, "LMBRIDGE_HOST", "0.0.0.0"),
            port: parse_env(lookup, "LMBRIDGE_PORT", 8000),
            log_level: env_or(lookup, "LMBRIDGE_LOG", "info"),
            log_json: flag(lookup, "LMBRIDGE_LOG_JSON", false),
            enable_swagger: flag(lookup, "LMBRIDGE_ENABLE_SWAGGER", true),
            cors_allowed_origins: non_empty(lookup, "LMBRIDGE_CORS_ORIGINS"),
            queue_capacity: parse_env(lookup, "LMBRIDGE_QUEUE_CAPACITY", 64),
        }
    }

    /// Apply command-line overrides; a flag wins over its environment variable.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(family) = cli.model {
            self.family = family;
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(quantization) = cli.quantize {
            self.quantization = quantization;
        }
        self
    }

    pub fn model_name(&self) -> &str {
        self.model_name
            .as_deref()
            .unwrap_or_else(|| self.family.default_model())
    }

    pub fn sampling_defaults(&self) -> SamplingDefaults {
        SamplingDefaults {
            max_tokens: self.max_tokens,
            temperature: self
                .temperature
                .unwrap_or_else(|| self.family.default_temperature()),
            top_p: self.top_p,
        }
    }

    /// Where the engine loads weights and tokenizer from.
    pub fn model_source(&self) -> ModelSource {
        ModelSource {
            tokenizer_repo: self.model_name().to_owned(),
            gguf_repo: self
                .gguf_repo
                .clone()
                .unwrap_or_else(|| self.family.gguf_repo().to_owned()),
            gguf_file: self
                .gguf_file
                .clone()
                .unwrap_or_else(|| self.family.gguf_file(self.quantization)),
            device: self.device,
            context_size: self.context_size,
            hf_token: self.hf_token.clone(),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

fn non_empty(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config(&[]);
        assert_eq!(cfg.family, ModelFamily::Deepseek);
        assert_eq!(cfg.model_name(), "deepseek-ai/deepseek-coder-6.7b-instruct");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert!(cfg.enable_swagger);
        assert!(!cfg.log_json);
        assert_eq!(cfg.queue_capacity, 64);
        assert_eq!(
            cfg.sampling_defaults(),
            SamplingDefaults {
                max_tokens: 1024,
                temperature: 0.2,
                top_p: 0.95
            }
        );
    }

    #[test]
    fn family_preset_drives_derived_defaults() {
        let cfg = config(&[("MODEL_FAMILY", "codellama")]);
        assert_eq!(cfg.model_name(), "codellama/CodeLlama-7b-Instruct-hf");
        assert_eq!(cfg.sampling_defaults().temperature, 0.4);

        let source = cfg.model_source();
        assert_eq!(source.tokenizer_repo, "codellama/CodeLlama-7b-Instruct-hf");
        assert_eq!(source.gguf_repo, "TheBloke/CodeLlama-7B-Instruct-GGUF");
        assert_eq!(source.gguf_file, "codellama-7b-instruct.Q4_K_M.gguf");
        assert_eq!(source.context_size, 6144);
    }

    #[test]
    fn explicit_values_override_presets() {
        let cfg = config(&[
            ("MODEL_NAME", "my/model"),
            ("DEFAULT_TEMPERATURE", "0.9"),
            ("MODEL_GGUF_FILE", "custom.gguf"),
            ("LMBRIDGE_ENABLE_SWAGGER", "false"),
        ]);
        assert_eq!(cfg.model_name(), "my/model");
        assert_eq!(cfg.sampling_defaults().temperature, 0.9);
        assert_eq!(cfg.model_source().gguf_file, "custom.gguf");
        assert!(!cfg.enable_swagger);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let cfg = config(&[("LMBRIDGE_PORT", "eighty"), ("MODEL_QUANTIZE", "3bit")]);
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.quantization, Quantization::FourBit);
    }

    #[test]
    fn cli_flags_win_over_environment() {
        let cfg = config(&[("MODEL_FAMILY", "deepseek"), ("LMBRIDGE_PORT", "8100")]).with_cli(
            &Cli {
                model: Some(ModelFamily::Codellama),
                port: Some(9000),
                quantize: Some(Quantization::EightBit),
            },
        );
        assert_eq!(cfg.family, ModelFamily::Codellama);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.model_source().gguf_file, "codellama-7b-instruct.Q8_0.gguf");
    }
}
