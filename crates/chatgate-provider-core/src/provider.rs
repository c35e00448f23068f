use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::errors::ProviderResult;
use crate::family::ProviderFamily;
use crate::prompt::PromptMessage;

/// Lazy, non-restartable sequence of generated text fragments.
pub type FragmentStream = BoxStream<'static, ProviderResult<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    /// Already clamped into the family's range.
    pub temperature: f64,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn family(&self) -> ProviderFamily;

    /// Opens the upstream stream. Errors before the first byte surface here;
    /// later failures arrive as `Err` items and end the stream.
    async fn stream(&self, request: CompletionRequest) -> ProviderResult<FragmentStream>;

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<String>;

    fn count_tokens(&self, text: &str, model: &str) -> i64;
}

/// Exactly one adapter per provider family.
#[derive(Clone)]
pub struct ProviderSet {
    pub openai: Arc<dyn ChatProvider>,
    pub anthropic: Arc<dyn ChatProvider>,
    pub mistral: Arc<dyn ChatProvider>,
    pub google: Arc<dyn ChatProvider>,
    pub together: Arc<dyn ChatProvider>,
    pub perplexity: Arc<dyn ChatProvider>,
}

impl ProviderSet {
    /// Routes every family to the same adapter (tests, single-backend setups).
    pub fn uniform(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            openai: provider.clone(),
            anthropic: provider.clone(),
            mistral: provider.clone(),
            google: provider.clone(),
            together: provider.clone(),
            perplexity: provider,
        }
    }

    pub fn adapter(&self, family: ProviderFamily) -> &Arc<dyn ChatProvider> {
        match family {
            ProviderFamily::OpenAI => &self.openai,
            ProviderFamily::Anthropic => &self.anthropic,
            ProviderFamily::Mistral => &self.mistral,
            ProviderFamily::Google => &self.google,
            ProviderFamily::Together => &self.together,
            ProviderFamily::Perplexity => &self.perplexity,
        }
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(ProviderFamily::ALL.iter().map(|family| self.adapter(*family).family()))
            .finish()
    }
}
