//! Model-family presets.
//!
//! Each supported family bundles the prompt template it expects with the
//! deployment defaults it ships with (model id, sampling temperature and the
//! quantized weight files).

use strum::{Display, EnumString};

use crate::prompt::TemplateVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ModelFamily {
    #[default]
    Deepseek,
    Codellama,
}

/// Weight precision of the GGUF file loaded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum Quantization {
    #[default]
    #[strum(serialize = "4bit")]
    FourBit,
    #[strum(serialize = "8bit")]
    EightBit,
    /// Unquantized half-precision weights.
    #[strum(serialize = "none")]
    Full,
}

impl Quantization {
    /// Suffix used by GGUF file names for this precision.
    pub fn gguf_suffix(self) -> &'static str {
        match self {
            Quantization::FourBit => "Q4_K_M",
            Quantization::EightBit => "Q8_0",
            Quantization::Full => "f16",
        }
    }
}

impl ModelFamily {
    pub fn template(self) -> TemplateVariant {
        match self {
            ModelFamily::Deepseek => TemplateVariant::TurnDelimited,
            ModelFamily::Codellama => TemplateVariant::InstructionBracket,
        }
    }

    /// Human-readable name used in the service banner.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelFamily::Deepseek => "DeepSeek Coder",
            ModelFamily::Codellama => "CodeLlama",
        }
    }

    /// Hugging Face id of the instruct model; also hosts `tokenizer.json`.
    pub fn default_model(self) -> &'static str {
        match self {
            ModelFamily::Deepseek => "deepseek-ai/deepseek-coder-6.7b-instruct",
            ModelFamily::Codellama => "codellama/CodeLlama-7b-Instruct-hf",
        }
    }

    pub fn default_temperature(self) -> f64 {
        match self {
            ModelFamily::Deepseek => 0.2,
            ModelFamily::Codellama => 0.4,
        }
    }

    /// Repository hosting the GGUF conversions of [`Self::default_model`].
    pub fn gguf_repo(self) -> &'static str {
        match self {
            ModelFamily::Deepseek => "TheBloke/deepseek-coder-6.7B-instruct-GGUF",
            ModelFamily::Codellama => "TheBloke/CodeLlama-7B-Instruct-GGUF",
        }
    }

    pub fn gguf_file(self, quantization: Quantization) -> String {
        let stem = match self {
            ModelFamily::Deepseek => "deepseek-coder-6.7b-instruct",
            ModelFamily::Codellama => "codellama-7b-instruct",
        };
        format!("{stem}.{}.gguf", quantization.gguf_suffix())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn family_selects_template() {
        assert_eq!(ModelFamily::Deepseek.template(), TemplateVariant::TurnDelimited);
        assert_eq!(
            ModelFamily::Codellama.template(),
            TemplateVariant::InstructionBracket
        );
    }

    #[test]
    fn family_and_quantization_parse() {
        assert_eq!("CodeLlama".parse::<ModelFamily>().ok(), Some(ModelFamily::Codellama));
        assert_eq!("8bit".parse::<Quantization>().ok(), Some(Quantization::EightBit));
        assert!("2bit".parse::<Quantization>().is_err());
    }

    #[test]
    fn gguf_file_follows_quantization() {
        assert_eq!(
            ModelFamily::Codellama.gguf_file(Quantization::FourBit),
            "codellama-7b-instruct.Q4_K_M.gguf"
        );
        assert_eq!(
            ModelFamily::Deepseek.gguf_file(Quantization::EightBit),
            "deepseek-coder-6.7b-instruct.Q8_0.gguf"
        );
    }
}
