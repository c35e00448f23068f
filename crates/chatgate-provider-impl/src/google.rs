use std::sync::Arc;

use async_trait::async_trait;

use chatgate_protocol::gemini::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
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

pub struct GoogleProvider {
    endpoint: ResolvedEndpoint,
    client: UpstreamClient,
    tokenizers: Arc<TokenizerSet>,
}

impl GoogleProvider {
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
        header_set(&mut headers, "x-goog-api-key", api_key);
        let path = if stream {
            format!("models/{}:streamGenerateContent?alt=sse", request.model)
        } else {
            format!("models/{}:generateContent", request.model)
        };
        let body = GenerateContentRequest {
            contents: request
                .messages
                .into_iter()
                .map(|message| Content {
                    role: Some(
                        match message.role {
                            Role::User => "user",
                            Role::Assistant => "model",
                        }
                        .to_string(),
                    ),
                    parts: vec![Part {
                        text: Some(message.content),
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };
        let body =
            serde_json::to_vec(&body).map_err(|err| ProviderError::Malformed(err.to_string()))?;
        Ok((self.endpoint.url(&path), headers, body))
    }
}

pub(crate) fn parse_frame(event: &SseEvent) -> Frame {
    if event.data.trim().is_empty() {
        return Frame::Skip;
    }
    match serde_json::from_str::<GenerateContentResponse>(&event.data) {
        Ok(GenerateContentResponse {
            error: Some(error), ..
        }) => Frame::Fail(ProviderError::ErrorEvent(error.message)),
        Ok(response) => Frame::Text(response.text()),
        Err(err) => malformed(event, err),
    }
}

#[async_trait]
impl ChatProvider for GoogleProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Google
    }

    async fn stream(&self, request: CompletionRequest) -> ProviderResult<FragmentStream> {
        let (url, headers, body) = self.build(request, true)?;
        let body = self.client.post_stream(&url, &headers, body).await?;
        Ok(fragment_stream(body, parse_frame))
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<String> {
        let (url, headers, body) = self.build(request, false)?;
        let bytes = self.client.post_json(&url, &headers, body).await?;
        let response: GenerateContentResponse =
            serde_json::from_slice(&bytes)
                .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        if let Some(error) = response.error {
            return Err(ProviderError::ErrorEvent(error.message));
        }
        Ok(response.text())
    }

    fn count_tokens(&self, text: &str, model: &str) -> i64 {
        self.tokenizers.count(ProviderFamily::Google, model, text)
    }
}
