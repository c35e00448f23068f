use std::sync::Arc;

use async_trait::async_trait;

use chatgate_protocol::anthropic::{
    API_VERSION, BlockDelta, ErrorEnvelope, Message, MessagesRequest, MessagesResponse,
    MessagesStreamEvent,
};
use chatgate_protocol::sse::SseEvent;
use chatgate_provider_core::{
    ChatProvider, CompletionRequest, FragmentStream, ProviderError, ProviderFamily,
    ProviderResult, Role,
};

use crate::client::{Headers, UpstreamClient, header_set, json_headers};
use crate::endpoint::ResolvedEndpoint;
use crate::fragments::{Frame, fragment_stream, malformed};
use crate::tokenizer::TokenizerSet;

const MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    endpoint: ResolvedEndpoint,
    client: UpstreamClient,
    tokenizers: Arc<TokenizerSet>,
}

impl AnthropicProvider {
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
        header_set(&mut headers, "x-api-key", api_key);
        header_set(&mut headers, "anthropic-version", API_VERSION);
        let body = MessagesRequest {
            model: request.model,
            max_tokens: MAX_TOKENS,
            messages: request
                .messages
                .into_iter()
                .map(|message| Message {
                    role: match message.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    }
                    .to_string(),
                    content: message.content,
                })
                .collect(),
            temperature: request.temperature,
            stream,
        };
        let body =
            serde_json::to_vec(&body).map_err(|err| ProviderError::Malformed(err.to_string()))?;
        Ok((self.endpoint.url("v1/messages"), headers, body))
    }
}

pub(crate) fn parse_frame(event: &SseEvent) -> Frame {
    if event.data.trim().is_empty() {
        return Frame::Skip;
    }
    match serde_json::from_str::<MessagesStreamEvent>(&event.data) {
        Ok(MessagesStreamEvent::ContentBlockDelta {
            delta: BlockDelta::TextDelta { text },
        }) => Frame::Text(text),
        Ok(MessagesStreamEvent::MessageStop) => Frame::Done,
        Ok(MessagesStreamEvent::Error { error }) => {
            Frame::Fail(ProviderError::ErrorEvent(format!("{}: {}", error.kind, error.message)))
        }
        Ok(_) => Frame::Skip,
        Err(err) => malformed(event, err),
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Anthropic
    }

    async fn stream(&self, request: CompletionRequest) -> ProviderResult<FragmentStream> {
        let (url, headers, body) = self.build(request, true)?;
        let body = self.client.post_stream(&url, &headers, body).await?;
        Ok(fragment_stream(body, parse_frame))
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<String> {
        let (url, headers, body) = self.build(request, false)?;
        let bytes = self.client.post_json(&url, &headers, body).await?;
        if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&bytes) {
            return Err(ProviderError::ErrorEvent(envelope.error.message));
        }
        let response: MessagesResponse =
            serde_json::from_slice(&bytes)
                .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        Ok(response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect())
    }

    fn count_tokens(&self, text: &str, model: &str) -> i64 {
        self.tokenizers.count(ProviderFamily::Anthropic, model, text)
    }
}
