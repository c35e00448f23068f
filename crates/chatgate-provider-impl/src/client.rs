use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{AUTHORIZATION, LOCATION};
use wreq::{Client, Proxy};

use chatgate_provider_core::{ProviderError, ProviderResult, UpstreamTransportErrorKind};

/// Streamed upstream body. A transport failure is delivered as the last item.
pub type ByteStream = tokio::sync::mpsc::Receiver<ProviderResult<Bytes>>;

pub type Headers = Vec<(String, String)>;

pub(crate) fn header_set(headers: &mut Headers, name: &str, value: impl Into<String>) {
    let value = value.into();
    if let Some(slot) = headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        slot.1 = value;
    } else {
        headers.push((name.to_string(), value));
    }
}

pub(crate) fn json_headers() -> Headers {
    let mut headers = Vec::new();
    header_set(&mut headers, "Accept", "application/json");
    header_set(&mut headers, "Content-Type", "application/json");
    headers
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn with_proxy(proxy: Option<String>) -> Self {
        Self {
            proxy: normalize_proxy(proxy),
            ..Self::default()
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(600),
            stream_idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared HTTP client for every provider adapter and tokenizer download.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    config: UpstreamClientConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    /// POSTs a JSON body and returns the whole response body.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &Headers,
        body: Vec<u8>,
    ) -> ProviderResult<Bytes> {
        let resp = self.send_post(url, headers, body).await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(map_wreq_error)?;
        if !(200..300).contains(&status) {
            return Err(ProviderError::from_status(status, error_excerpt(&bytes)));
        }
        Ok(bytes)
    }

    /// POSTs a JSON body and streams the response once the status is 2xx.
    pub async fn post_stream(
        &self,
        url: &str,
        headers: &Headers,
        body: Vec<u8>,
    ) -> ProviderResult<ByteStream> {
        let resp = self.send_post(url, headers, body).await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let bytes = resp.bytes().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, error_excerpt(&bytes)));
        }

        let idle = self.config.stream_idle_timeout;
        let (tx, rx) = tokio::sync::mpsc::channel::<ProviderResult<Bytes>>(16);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            loop {
                let item = match tokio::time::timeout(idle, stream.next()).await {
                    Ok(Some(Ok(chunk))) => Ok(chunk),
                    Ok(Some(Err(err))) => Err(map_wreq_error(err)),
                    Ok(None) => break,
                    Err(_) => Err(ProviderError::Transport {
                        kind: UpstreamTransportErrorKind::ReadTimeout,
                        message: format!("no upstream data for {}s", idle.as_secs()),
                    }),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });
        Ok(rx)
    }

    /// GET with manual redirect following, used for tokenizer downloads.
    pub async fn get_bytes(&self, url: &str, bearer: Option<&str>) -> ProviderResult<Bytes> {
        let mut redirects = 0usize;
        let mut current_url = url.to_string();
        loop {
            let mut req = self.client.get(current_url.clone());
            if let Some(token) = bearer.filter(|token| !token.is_empty()) {
                req = req.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let resp = req.send().await.map_err(map_wreq_error)?;
            let status = resp.status();
            if status.is_success() {
                return resp.bytes().await.map_err(map_wreq_error);
            }
            if status.is_redirection() && redirects < 5 {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.to_string());
                if let Some(location) = location {
                    current_url = join_redirect_url(&current_url, &location);
                    redirects += 1;
                    continue;
                }
            }
            let body = resp.bytes().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), error_excerpt(&body)));
        }
    }

    async fn send_post(
        &self,
        url: &str,
        headers: &Headers,
        body: Vec<u8>,
    ) -> ProviderResult<wreq::Response> {
        let mut builder = self.client.post(url);
        for (key, value) in headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder.body(body).send().await.map_err(map_wreq_error)
    }
}

fn normalize_proxy(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

fn build_client(config: &UpstreamClientConfig) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout);

    if let Some(proxy) = config.proxy.as_deref() {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

fn error_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(512).collect()
}

fn join_redirect_url(base: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }
    if let Some(pos) = base.find("://") {
        let scheme_end = pos + 3;
        if let Some(slash) = base[scheme_end..].find('/') {
            return format!("{}{location}", &base[..scheme_end + slash]);
        }
        return format!("{base}{location}");
    }
    format!("{}{}", base.trim_end_matches('/'), location)
}

pub(crate) fn map_wreq_error(err: wreq::Error) -> ProviderError {
    ProviderError::Transport {
        kind: classify_wreq_error(&err),
        message: err.to_string(),
    }
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    if err.is_timeout() {
        let message = err.to_string().to_ascii_lowercase();
        if message.contains("read") || message.contains("idle") {
            return UpstreamTransportErrorKind::ReadTimeout;
        }
        return UpstreamTransportErrorKind::Timeout;
    }
    if err.is_connect() || err.is_connection_reset() {
        return UpstreamTransportErrorKind::Connect;
    }
    UpstreamTransportErrorKind::Other
}
