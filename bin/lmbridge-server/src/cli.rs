//! Command-line overrides for the environment configuration.

use clap::Parser;
use lmbridge_core::{ModelFamily, Quantization};

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "lmbridge-server", version, about = "OpenAI-compatible chat completions for a local code model")]
pub struct Cli {
    /// Model family to serve (`deepseek` or `codellama`). Overrides MODEL_FAMILY.
    #[arg(long = "model")]
    pub model: Option<ModelFamily>,

    /// TCP port to listen on. Overrides LMBRIDGE_PORT.
    #[arg(long)]
    pub port: Option<u16>,

    /// Weight precision (`4bit`, `8bit` or `none`). Overrides MODEL_QUANTIZE.
    #[arg(long)]
    pub quantize: Option<Quantization>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_all_overrides() {
        let cli = Cli::try_parse_from([
            "lmbridge-server",
            "--model",
            "codellama",
            "--port",
            "9000",
            "--quantize",
            "8bit",
        ])
        .expect("parse");
        assert_eq!(cli.model, Some(ModelFamily::Codellama));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.quantize, Some(Quantization::EightBit));
    }

    #[test]
    fn flags_are_optional() {
        let cli = Cli::try_parse_from(["lmbridge-server"]).expect("parse");
        assert!(cli.model.is_none() && cli.port.is_none() && cli.quantize.is_none());
    }

    #[test]
    fn unknown_quantization_is_rejected() {
        assert!(Cli::try_parse_from(["lmbridge-server", "--quantize", "2bit"]).is_err());
    }
}
