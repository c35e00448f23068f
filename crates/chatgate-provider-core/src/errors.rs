use crate::family::ProviderFamily;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Other,
}

impl UpstreamTransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamTransportErrorKind::Timeout => "timeout",
            UpstreamTransportErrorKind::ReadTimeout => "read_timeout",
            UpstreamTransportErrorKind::Connect => "connect",
            UpstreamTransportErrorKind::Other => "other",
        }
    }
}

/// Everything that can go wrong talking to an upstream model provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("upstream transport error ({}): {message}", kind.as_str())]
    Transport {
        kind: UpstreamTransportErrorKind,
        message: String,
    },
    #[error("upstream rejected credentials (status {status})")]
    Unauthorized { status: u16 },
    #[error("upstream rate limited the request")]
    RateLimited,
    #[error("upstream returned status {status}: {message}")]
    Http { status: u16, message: String },
    /// Error event delivered inside an otherwise successful stream.
    #[error("upstream error event: {0}")]
    ErrorEvent(String),
    #[error("malformed upstream frame: {0}")]
    Malformed(String),
    #[error("provider {0} has no api key configured")]
    NotConfigured(ProviderFamily),
}

impl ProviderError {
    /// Maps a non-2xx status and its (possibly truncated) body text.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => ProviderError::Unauthorized { status },
            429 => ProviderError::RateLimited,
            _ => ProviderError::Http {
                status,
                message: message.into(),
            },
        }
    }

    /// Message safe to show to the end user.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProviderError::RateLimited => "The model provider is busy. Please retry shortly.",
            ProviderError::Unauthorized { .. } | ProviderError::NotConfigured(_) => {
                "The selected model is currently unavailable."
            }
            _ => "The model provider failed to complete the response.",
        }
    }
}
