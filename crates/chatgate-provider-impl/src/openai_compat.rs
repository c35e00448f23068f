//! Adapter for OpenAI-compatible `chat/completions` backends: OpenAI,
//! Mistral, Together and Perplexity.

use std::sync::Arc;

use async_trait::async_trait;

use chatgate_protocol::openai::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ErrorEnvelope,
    STREAM_DONE,
};
use chatgate_protocol::sse::SseEvent;
use chatgate_provider_core::{
    ChatProvider, CompletionRequest, FragmentStream, PromptMessage, ProviderError,
    ProviderFamily, ProviderResult, Role,
};

use crate::client::{Headers, UpstreamClient, header_set, json_headers};
use crate::endpoint::ResolvedEndpoint;
use crate::fragments::{Frame, fragment_stream, malformed};
use crate::tokenizer::TokenizerSet;

pub struct OpenAiCompatProvider {
    endpoint: ResolvedEndpoint,
    client: UpstreamClient,
    tokenizers: Arc<TokenizerSet>,
}

impl OpenAiCompatProvider {
    pub fn new(
        endpoint: ResolvedEndpoint,
        client: UpstreamClient,
        tokenizers: Arc<TokenizerSet>,
    ) -> Self {
        Self {
            endpoint,
            client,
            tokenizers,
        }
    }

    fn build(
        &self,
        request: CompletionRequest,
        stream: bool,
    ) -> ProviderResult<(String, Headers, Vec<u8>)> {
        let api_key = self.endpoint.api_key()?;
        let mut headers = json_headers();
        header_set(&mut headers, "Authorization", format!("Bearer {api_key}"));
        if stream {
            header_set(&mut headers, "Accept", "text/event-stream");
        }
        let body = ChatCompletionRequest {
            model: request.model,
            messages: request.messages.iter().map(to_wire_message).collect(),
            temperature: request.temperature,
            stream,
        };
        let body =
            serde_json::to_vec(&body).map_err(|err| ProviderError::Malformed(err.to_string()))?;
        Ok((self.endpoint.url("chat/completions"), headers, body))
    }
}

fn to_wire_message(message: &PromptMessage) -> ChatMessage {
    ChatMessage {
        role: match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
        .to_string(),
        content: message.content.clone(),
    }
}

pub(crate) fn parse_frame(event: &SseEvent) -> Frame {
    let data = event.data.trim();
    if data.is_empty() {
        return Frame::Skip;
    }
    if data == STREAM_DONE {
        return Frame::Done;
    }
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        return Frame::Fail(ProviderError::ErrorEvent(envelope.error.message));
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .map(Frame::Text)
            .unwrap_or(Frame::Skip),
        Err(err) => malformed(event, err),
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn family(&self) -> ProviderFamily {
        self.endpoint.family
    }

    async fn stream(&self, request: CompletionRequest) -> ProviderResult<FragmentStream> {
        let (url, headers, body) = self.build(request, true)?;
        let body = self.client.post_stream(&url, &headers, body).await?;
        Ok(fragment_stream(body, parse_frame))
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<String> {
        let (url, headers, body) = self.build(request, false)?;
        let bytes = self.client.post_json(&url, &headers, body).await?;
        let completion: ChatCompletion =
            serde_json::from_slice(&bytes)
                .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Malformed("completion without choices".to_string()))
    }

    fn count_tokens(&self, text: &str, model: &str) -> i64 {
        self.tokenizers.count(self.endpoint.family, model, text)
    }
}
