use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use futures_util::StreamExt;

use chatgate_common::{UpstreamEndpoint, UpstreamEndpoints};
use chatgate_provider_core::{
    CompletionRequest, PromptMessage, ProviderError, ProviderFamily,
};
use chatgate_provider_impl::{
    TokenizerSet, UpstreamClient, UpstreamClientConfig, build_provider_set,
};

async fn openai_stream(headers: HeaderMap) -> impl IntoResponse {
    if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn rate_limited() -> impl IntoResponse {
    (StatusCode::TOO_MANY_REQUESTS, "{\"error\":{\"message\":\"slow down\"}}")
}

async fn anthropic_messages(headers: HeaderMap) -> impl IntoResponse {
    assert_eq!(
        headers.get("anthropic-version").and_then(|v| v.to_str().ok()),
        Some("2023-06-01")
    );
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"content":[{"type":"text","text":"A short title"}]}"#,
    )
}

async fn gemini_stream() -> impl IntoResponse {
    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"one \"}]}}]}\r\n\r\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"two\"}]}}]}\r\n\r\n",
        "data: {\"error\":{\"code\":500,\"message\":\"internal\"}}\r\n\r\n",
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/openai/v1/chat/completions", post(openai_stream))
        .route("/mistral/v1/chat/completions", post(rate_limited))
        .route("/anthropic/v1/messages", post(anthropic_messages))
        .route(
            "/google/v1beta/models/{action}",
            post(gemini_stream),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn endpoint(addr: SocketAddr, path: &str) -> UpstreamEndpoint {
    UpstreamEndpoint {
        api_key: Some("sk-test".to_string()),
        base_url: Some(format!("http://{addr}/{path}")),
    }
}

fn request(model: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: vec![PromptMessage::user("Hello")],
        temperature: 0.5,
    }
}

async fn providers() -> chatgate_provider_core::ProviderSet {
    let addr = spawn_upstream().await;
    let endpoints = UpstreamEndpoints {
        openai: endpoint(addr, "openai/v1"),
        mistral: endpoint(addr, "mistral/v1"),
        anthropic: endpoint(addr, "anthropic"),
        google: endpoint(addr, "google/v1beta"),
        together: UpstreamEndpoint::default(),
        perplexity: UpstreamEndpoint::default(),
    };
    let client = UpstreamClient::new(UpstreamClientConfig::default()).unwrap();
    let tokenizers = Arc::new(TokenizerSet::reference_only().unwrap());
    build_provider_set(&client, &endpoints, tokenizers)
}

#[tokio::test]
async fn openai_stream_yields_fragments_in_order() {
    let providers = providers().await;
    let stream = providers
        .adapter(ProviderFamily::OpenAI)
        .stream(request("gpt-4o-mini"))
        .await
        .unwrap();
    let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
    assert_eq!(fragments, vec!["Hel".to_string(), "lo".to_string()]);
}

#[tokio::test]
async fn non_success_status_fails_before_streaming() {
    let providers = providers().await;
    let err = match providers
        .adapter(ProviderFamily::Mistral)
        .stream(request("mistral-tiny-2312"))
        .await
    {
        Ok(_) => panic!("expected rate limit"),
        Err(err) => err,
    };
    assert!(matches!(err, ProviderError::RateLimited));
}

#[tokio::test]
async fn missing_key_is_reported_without_network() {
    let providers = providers().await;
    let err = providers
        .adapter(ProviderFamily::Together)
        .complete(request("meta-llama/Llama-3-8b-chat-hf"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotConfigured(ProviderFamily::Together)));
}

#[tokio::test]
async fn anthropic_complete_joins_text_blocks() {
    let providers = providers().await;
    let text = providers
        .adapter(ProviderFamily::Anthropic)
        .complete(request("claude-3-haiku-20240307"))
        .await
        .unwrap();
    assert_eq!(text, "A short title");
}

#[tokio::test]
async fn gemini_error_event_ends_stream_after_fragments() {
    let providers = providers().await;
    let stream = providers
        .adapter(ProviderFamily::Google)
        .stream(request("gemini-1.0-pro"))
        .await
        .unwrap();
    let items: Vec<_> = stream.collect().await;
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_deref().ok(), Some("one "));
    assert_eq!(items[1].as_deref().ok(), Some("two"));
    assert!(matches!(items[2], Err(ProviderError::ErrorEvent(_))));
}
