use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
    #[error("invalid config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Credentials and endpoint override for one upstream provider family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamEndpoint {
    pub api_key: Option<String>,
    /// Overrides the family's default base URL.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamEndpoints {
    pub openai: UpstreamEndpoint,
    pub anthropic: UpstreamEndpoint,
    pub mistral: UpstreamEndpoint,
    pub google: UpstreamEndpoint,
    pub together: UpstreamEndpoint,
    pub perplexity: UpstreamEndpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// HuggingFace repo holding a `tokenizer.json` for Anthropic models.
    pub anthropic_repo: Option<String>,
    /// HuggingFace repo holding a `tokenizer.json` for Gemini models.
    pub google_repo: Option<String>,
    pub hf_token: Option<String>,
    pub hf_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub enabled: bool,
    pub key_id: String,
    pub key_secret: String,
    pub base_url: Option<String>,
}

/// Final configuration used by the running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub dsn: String,
    pub data_dir: String,
    /// HS256 secret for bearer tokens.
    pub jwt_secret: String,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    /// Single allowed CORS origin; any origin when unset.
    pub cors_origin: Option<String>,
    pub upstreams: UpstreamEndpoints,
    pub tokenizers: TokenizerConfig,
    pub payment: PaymentConfig,
}

/// Partially-specified configuration, validated by [`GatewayConfigPatch::into_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dsn: Option<String>,
    pub data_dir: Option<String>,
    pub jwt_secret: Option<String>,
    pub proxy: Option<String>,
    pub cors_origin: Option<String>,
    pub upstreams: UpstreamEndpoints,
    pub tokenizers: TokenizerConfig,
    pub payment_enabled: Option<bool>,
    pub payment_key_id: Option<String>,
    pub payment_key_secret: Option<String>,
    pub payment_base_url: Option<String>,
}

impl GatewayConfigPatch {
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let jwt_secret = non_empty(self.jwt_secret).ok_or(ConfigError::MissingField("jwt_secret"))?;
        let payment_enabled = self.payment_enabled.unwrap_or(false);
        let key_id = non_empty(self.payment_key_id);
        let key_secret = non_empty(self.payment_key_secret);
        if payment_enabled && (key_id.is_none() || key_secret.is_none()) {
            return Err(ConfigError::Invalid {
                field: "payment",
                reason: "payments are enabled but the gateway key id/secret is missing".to_string(),
            });
        }

        Ok(GatewayConfig {
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: self.port.unwrap_or(5000),
            dsn: self.dsn.ok_or(ConfigError::MissingField("dsn"))?,
            data_dir: self.data_dir.unwrap_or_else(|| "./data".to_string()),
            jwt_secret,
            proxy: non_empty(self.proxy),
            cors_origin: non_empty(self.cors_origin).filter(|origin| origin != "*"),
            upstreams: self.upstreams,
            tokenizers: self.tokenizers,
            payment: PaymentConfig {
                enabled: payment_enabled,
                key_id: key_id.unwrap_or_default(),
                key_secret: key_secret.unwrap_or_default(),
                base_url: non_empty(self.payment_base_url),
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}
