use chatgate_provider_core::{ProviderError, UnknownModel};
use chatgate_storage::StorageError;

use crate::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    UnknownModel(#[from] UnknownModel),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("generations limit exceeded")]
    QuotaExceeded,
    #[error("access to this chat is forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Upstream(#[from] ProviderError),
    #[error("persistence failure: {0}")]
    Persistence(#[source] StorageError),
    #[error("payment is disabled")]
    PaymentDisabled,
    #[error("invalid payment signature")]
    InvalidSignature,
    #[error("payment {0} already exists")]
    DuplicatePayment(String),
    #[error("payment was not captured")]
    PaymentNotCaptured,
    #[error("invalid plan id: {0}")]
    InvalidPlan(String),
    #[error("payment gateway error: {0}")]
    PaymentGateway(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OwnerMismatch { .. } => GatewayError::Forbidden,
            StorageError::NotFound(what) => GatewayError::NotFound(what),
            StorageError::DuplicatePayment(id) => GatewayError::DuplicatePayment(id),
            err @ StorageError::Db(_) => GatewayError::Persistence(err),
        }
    }
}

impl GatewayError {
    /// Text safe to return to the caller. Internal failures stay opaque.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Upstream(err) => err.public_message().to_string(),
            GatewayError::Persistence(_)
            | GatewayError::PaymentGateway(_)
            | GatewayError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
