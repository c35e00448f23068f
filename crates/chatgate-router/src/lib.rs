//! HTTP surface of the chat gateway.

mod error;
mod handlers;
mod sse;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use chatgate_core::AppState;

pub use error::{ApiError, status_of};
pub use sse::sse_response;

pub fn gateway_router(state: Arc<AppState>, cors_origin: Option<&str>) -> Router {
    let authed = Router::new()
        .route("/v1/chat_event_streaming", post(handlers::chat_event_streaming))
        .route("/v1/chat_title", post(handlers::chat_title))
        .route("/v1/chat_history", get(handlers::chat_history))
        .route("/v1/chat_by_id", get(handlers::chat_by_id))
        .route("/v1/generations", get(handlers::generations))
        .route("/v1/create_order", post(handlers::create_order))
        .route("/v1/verify_payment", post(handlers::verify_payment))
        .route("/v1/fetch_payments", get(handlers::fetch_payments))
        .route("/v1/fetch_payment/{payment_id}", get(handlers::fetch_payment))
        .route("/auth/verify", get(handlers::auth_verify))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/models", get(handlers::models))
        .merge(authed)
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = state.auth.authenticate(req.headers())?;
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let Some(origin) = origin else {
        return CorsLayer::permissive();
    };
    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin = %origin, "invalid cors origin, allowing any");
            CorsLayer::permissive()
        }
    }
}
