use chatgate_common::UpstreamEndpoint;
use chatgate_provider_core::{ProviderError, ProviderFamily, ProviderResult};

pub fn default_base_url(family: ProviderFamily) -> &'static str {
    match family {
        ProviderFamily::OpenAI => "https://api.openai.com/v1",
        ProviderFamily::Anthropic => "https://api.anthropic.com",
        ProviderFamily::Mistral => "https://api.mistral.ai/v1",
        ProviderFamily::Google => "https://generativelanguage.googleapis.com/v1beta",
        ProviderFamily::Together => "https://api.together.xyz/v1",
        // Perplexity serves chat/completions at the root.
        ProviderFamily::Perplexity => "https://api.perplexity.ai",
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub family: ProviderFamily,
    pub base_url: String,
    api_key: Option<String>,
}

impl ResolvedEndpoint {
    pub fn resolve(family: ProviderFamily, endpoint: &UpstreamEndpoint) -> Self {
        let base_url = endpoint
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(default_base_url(family))
            .trim_end_matches('/')
            .to_string();
        let api_key = endpoint
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Self {
            family,
            base_url,
            api_key,
        }
    }

    pub fn api_key(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured(self.family))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
