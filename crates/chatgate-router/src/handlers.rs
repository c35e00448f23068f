use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use chatgate_core::{AppState, AuthContext};
use chatgate_protocol::chat::{
    ChatRequest, ExchangeEntryView, ExchangeSummary, GenerationsResponse, ModelInfo,
    TitleResponse,
};
use chatgate_protocol::payment::{
    CreateOrderResponse, PaymentRequest, PaymentStatusResponse, PaymentView,
};

use crate::error::ApiError;
use crate::sse::sse_response;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    #[serde(default = "first_page")]
    page: u64,
    #[serde(default = "default_limit")]
    limit: u64,
}

fn first_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatByIdQuery {
    chat_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderQuery {
    plan_id: String,
}

pub(crate) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub(crate) async fn models(State(state): State<Arc<AppState>>) -> Json<Vec<ModelInfo>> {
    Json(state.gateway.models())
}

pub(crate) async fn auth_verify(Extension(auth): Extension<AuthContext>) -> impl IntoResponse {
    Json(serde_json::json!({ "token_info": auth.claims }))
}

pub(crate) async fn chat_event_streaming(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let events = state.gateway.open_stream(&auth.user_id, request).await?;
    Ok(sse_response(events))
}

pub(crate) async fn chat_title(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<TitleResponse> {
    let response = state.gateway.generate_title(&auth.user_id, request).await?;
    Ok(Json(TitleResponse { response }))
}

pub(crate) async fn chat_history(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<ExchangeSummary>> {
    let rows = state
        .gateway
        .history(&auth.user_id, query.page, query.limit)
        .await?;
    Ok(Json(rows))
}

pub(crate) async fn chat_by_id(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ChatByIdQuery>,
) -> ApiResult<Vec<ExchangeEntryView>> {
    let entries = state.gateway.exchange(&auth.user_id, &query.chat_id).await?;
    Ok(Json(entries))
}

pub(crate) async fn generations(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<GenerationsResponse> {
    let generations_left = state.gateway.generations(&auth.user_id).await?;
    Ok(Json(GenerationsResponse { generations_left }))
}

pub(crate) async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<OrderQuery>,
) -> ApiResult<CreateOrderResponse> {
    let order = state
        .payments
        .create_order(&auth.user_id, &query.plan_id)
        .await?;
    Ok(Json(order))
}

pub(crate) async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<PaymentStatusResponse> {
    let status = state.payments.verify_payment(&auth.user_id, request).await?;
    Ok(Json(status))
}

pub(crate) async fn fetch_payments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Vec<PaymentView>> {
    Ok(Json(state.payments.payments(&auth.user_id).await?))
}

pub(crate) async fn fetch_payment(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<String>,
) -> ApiResult<PaymentView> {
    Ok(Json(state.payments.payment(&auth.user_id, &payment_id).await?))
}
