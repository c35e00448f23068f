//! Concrete provider adapters over a shared `wreq` client.

mod anthropic;
mod client;
mod endpoint;
mod fragments;
mod google;
mod openai_compat;
mod tokenizer;

use std::sync::Arc;

use chatgate_common::{UpstreamEndpoint, UpstreamEndpoints};
use chatgate_provider_core::{ProviderFamily, ProviderSet};

pub use anthropic::AnthropicProvider;
pub use client::{ByteStream, Headers, UpstreamClient, UpstreamClientConfig};
pub use endpoint::{ResolvedEndpoint, default_base_url};
pub use google::GoogleProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use tokenizer::{TokenCounter, TokenizerError, TokenizerSet};

/// Builds one adapter per family from the configured endpoints.
pub fn build_provider_set(
    client: &UpstreamClient,
    endpoints: &UpstreamEndpoints,
    tokenizers: Arc<TokenizerSet>,
) -> ProviderSet {
    let compat = |family: ProviderFamily, endpoint: &UpstreamEndpoint| {
        Arc::new(OpenAiCompatProvider::new(
            ResolvedEndpoint::resolve(family, endpoint),
            client.clone(),
            tokenizers.clone(),
        ))
    };

    ProviderSet {
        openai: compat(ProviderFamily::OpenAI, &endpoints.openai),
        mistral: compat(ProviderFamily::Mistral, &endpoints.mistral),
        together: compat(ProviderFamily::Together, &endpoints.together),
        perplexity: compat(ProviderFamily::Perplexity, &endpoints.perplexity),
        anthropic: Arc::new(AnthropicProvider::new(
            ResolvedEndpoint::resolve(ProviderFamily::Anthropic, &endpoints.anthropic),
            client.clone(),
            tokenizers.clone(),
        )),
        google: Arc::new(GoogleProvider::new(
            ResolvedEndpoint::resolve(ProviderFamily::Google, &endpoints.google),
            client.clone(),
            tokenizers,
        )),
    }
}
