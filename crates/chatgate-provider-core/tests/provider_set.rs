use std::sync::Arc;

use async_trait::async_trait;
use chatgate_provider_core::{
    ChatProvider, CompletionRequest, FragmentStream, ModelRegistry, PromptMessage,
    ProviderError, ProviderFamily, ProviderResult, ProviderSet,
};
use futures_util::StreamExt;

struct Tagged(ProviderFamily);

#[async_trait]
impl ChatProvider for Tagged {
    fn family(&self) -> ProviderFamily {
        self.0
    }

    async fn stream(&self, request: CompletionRequest) -> ProviderResult<FragmentStream> {
        let items: Vec<ProviderResult<String>> = vec![
            Ok(request.model.clone()),
            Err(ProviderError::ErrorEvent("overloaded".to_string())),
        ];
        Ok(futures_util::stream::iter(items).boxed())
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<String> {
        Ok(format!("{}:{}", self.0, request.messages.len()))
    }

    fn count_tokens(&self, text: &str, _model: &str) -> i64 {
        text.split_whitespace().count() as i64
    }
}

fn set() -> ProviderSet {
    ProviderSet {
        openai: Arc::new(Tagged(ProviderFamily::OpenAI)),
        anthropic: Arc::new(Tagged(ProviderFamily::Anthropic)),
        mistral: Arc::new(Tagged(ProviderFamily::Mistral)),
        google: Arc::new(Tagged(ProviderFamily::Google)),
        together: Arc::new(Tagged(ProviderFamily::Together)),
        perplexity: Arc::new(Tagged(ProviderFamily::Perplexity)),
    }
}

#[test]
fn every_builtin_model_resolves_to_its_family_adapter() {
    let registry = ModelRegistry::builtin();
    let providers = set();
    for descriptor in registry.list() {
        assert_eq!(providers.adapter(descriptor.family).family(), descriptor.family);
    }
}

#[tokio::test]
async fn stream_ends_with_error_item_without_fabricated_final() {
    let providers = set();
    let stream = providers
        .adapter(ProviderFamily::Mistral)
        .stream(CompletionRequest {
            model: "mistral-tiny-2312".to_string(),
            messages: vec![PromptMessage::user("hi")],
            temperature: 0.5,
        })
        .await
        .unwrap();
    let items: Vec<_> = stream.collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().ok(), Some("mistral-tiny-2312"));
    assert!(matches!(items[1], Err(ProviderError::ErrorEvent(_))));
}
