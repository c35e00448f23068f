use clap::Parser;

use chatgate_common::{GatewayConfigPatch, TokenizerConfig, UpstreamEndpoint, UpstreamEndpoints};

#[derive(Debug, Parser)]
#[command(name = "chatgate", version, about = "Metered streaming gateway for chat models")]
pub(crate) struct Cli {
    /// Database DSN. Defaults to a sqlite file under the data dir.
    #[arg(long, env = "CHATGATE_DSN")]
    pub(crate) dsn: Option<String>,
    #[arg(long, env = "CHATGATE_DATA_DIR")]
    pub(crate) data_dir: Option<String>,
    #[arg(long, env = "CHATGATE_HOST")]
    pub(crate) host: Option<String>,
    #[arg(long, env = "CHATGATE_PORT")]
    pub(crate) port: Option<u16>,
    /// HS256 secret shared with the login service.
    #[arg(long, env = "CHATGATE_JWT_SECRET", hide_env_values = true)]
    pub(crate) jwt_secret: Option<String>,
    /// Outbound proxy for upstream requests.
    #[arg(long, env = "CHATGATE_PROXY")]
    pub(crate) proxy: Option<String>,
    #[arg(long, env = "CHATGATE_CORS_ORIGIN")]
    pub(crate) cors_origin: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub(crate) openai_api_key: Option<String>,
    #[arg(long, env = "CHATGATE_OPENAI_BASE_URL")]
    pub(crate) openai_base_url: Option<String>,
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub(crate) anthropic_api_key: Option<String>,
    #[arg(long, env = "CHATGATE_ANTHROPIC_BASE_URL")]
    pub(crate) anthropic_base_url: Option<String>,
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    pub(crate) mistral_api_key: Option<String>,
    #[arg(long, env = "CHATGATE_MISTRAL_BASE_URL")]
    pub(crate) mistral_base_url: Option<String>,
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub(crate) google_api_key: Option<String>,
    #[arg(long, env = "CHATGATE_GOOGLE_BASE_URL")]
    pub(crate) google_base_url: Option<String>,
    #[arg(long, env = "TOGETHER_API_KEY", hide_env_values = true)]
    pub(crate) together_api_key: Option<String>,
    #[arg(long, env = "CHATGATE_TOGETHER_BASE_URL")]
    pub(crate) together_base_url: Option<String>,
    #[arg(long, env = "PERPLEXITY_API_KEY", hide_env_values = true)]
    pub(crate) perplexity_api_key: Option<String>,
    #[arg(long, env = "CHATGATE_PERPLEXITY_BASE_URL")]
    pub(crate) perplexity_base_url: Option<String>,

    /// HuggingFace repo with a `tokenizer.json` for Anthropic models.
    #[arg(long, env = "CHATGATE_ANTHROPIC_TOKENIZER")]
    pub(crate) anthropic_tokenizer: Option<String>,
    /// HuggingFace repo with a `tokenizer.json` for Gemini models.
    #[arg(long, env = "CHATGATE_GOOGLE_TOKENIZER")]
    pub(crate) google_tokenizer: Option<String>,
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub(crate) hf_token: Option<String>,
    #[arg(long, env = "CHATGATE_HF_URL")]
    pub(crate) hf_url: Option<String>,

    #[arg(
        long,
        env = "CHATGATE_ENABLE_PAYMENT",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub(crate) enable_payment: Option<bool>,
    #[arg(long, env = "RAZORPAY_KEY_ID")]
    pub(crate) razorpay_key_id: Option<String>,
    #[arg(long, env = "RAZORPAY_KEY_SECRET", hide_env_values = true)]
    pub(crate) razorpay_key_secret: Option<String>,
    #[arg(long, env = "CHATGATE_RAZORPAY_URL")]
    pub(crate) razorpay_url: Option<String>,
}

fn endpoint(api_key: Option<String>, base_url: Option<String>) -> UpstreamEndpoint {
    UpstreamEndpoint { api_key, base_url }
}

impl Cli {
    pub(crate) fn into_patch(self, data_dir: String, dsn: String) -> GatewayConfigPatch {
        GatewayConfigPatch {
            host: self.host,
            port: self.port,
            dsn: Some(dsn),
            data_dir: Some(data_dir),
            jwt_secret: self.jwt_secret,
            proxy: self.proxy,
            cors_origin: self.cors_origin,
            upstreams: UpstreamEndpoints {
                openai: endpoint(self.openai_api_key, self.openai_base_url),
                anthropic: endpoint(self.anthropic_api_key, self.anthropic_base_url),
                mistral: endpoint(self.mistral_api_key, self.mistral_base_url),
                google: endpoint(self.google_api_key, self.google_base_url),
                together: endpoint(self.together_api_key, self.together_base_url),
                perplexity: endpoint(self.perplexity_api_key, self.perplexity_base_url),
            },
            tokenizers: TokenizerConfig {
                anthropic_repo: self.anthropic_tokenizer,
                google_repo: self.google_tokenizer,
                hf_token: self.hf_token,
                hf_url: self.hf_url,
            },
            payment_enabled: self.enable_payment,
            payment_key_id: self.razorpay_key_id,
            payment_key_secret: self.razorpay_key_secret,
            payment_base_url: self.razorpay_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_land_in_the_patch() {
        let cli = Cli::try_parse_from([
            "chatgate",
            "--port",
            "8080",
            "--jwt-secret",
            "s",
            "--openai-api-key",
            "sk-test",
            "--enable-payment",
            "yes",
        ])
        .unwrap();
        let patch = cli.into_patch("./data".to_string(), "sqlite::memory:".to_string());
        assert_eq!(patch.port, Some(8080));
        assert_eq!(patch.upstreams.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(patch.payment_enabled, Some(true));
        assert_eq!(patch.dsn.as_deref(), Some("sqlite::memory:"));
    }
}
