use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use chatgate_core::{AuthError, GatewayError};

/// HTTP face of [`GatewayError`]. Bodies use `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(GatewayError::Auth(err))
    }
}

pub fn status_of(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
        GatewayError::UnknownModel(_)
        | GatewayError::BadRequest(_)
        | GatewayError::InvalidSignature
        | GatewayError::DuplicatePayment(_)
        | GatewayError::PaymentNotCaptured
        | GatewayError::InvalidPlan(_) => StatusCode::BAD_REQUEST,
        GatewayError::QuotaExceeded | GatewayError::Forbidden | GatewayError::PaymentDisabled => {
            StatusCode::FORBIDDEN
        }
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Persistence(_)
        | GatewayError::PaymentGateway(_)
        | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status.is_server_error() {
            error!(event = "request_failed", status = status.as_u16(), error = %self.0);
        }
        let body = serde_json::json!({ "detail": self.0.public_message() });
        (status, Json(body)).into_response()
    }
}
