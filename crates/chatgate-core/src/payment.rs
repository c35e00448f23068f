//! Prepaid generation packs sold through Razorpay orders.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use chatgate_common::PaymentConfig;
use chatgate_protocol::payment::{
    CreateOrderResponse, PaymentRequest, PaymentStatusResponse, PaymentView,
};
use chatgate_storage::{NewOrder, NewPayment, PaymentRecord, PaymentStore};

use crate::error::GatewayError;

pub const CURRENCY: &str = "INR";
pub const DEFAULT_RAZORPAY_URL: &str = "https://api.razorpay.com/v1";
const CAPTURED_STATUS: &str = "paid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub id: &'static str,
    /// Whole rupees.
    pub price: i64,
    pub generations: i64,
}

pub const PLANS: [Plan; 3] = [
    Plan { id: "plan_50", price: 399, generations: 50 },
    Plan { id: "plan_150", price: 899, generations: 150 },
    Plan { id: "plan_300", price: 1799, generations: 300 },
];

pub fn plan(plan_id: &str) -> Result<Plan, GatewayError> {
    PLANS
        .iter()
        .copied()
        .find(|plan| plan.id == plan_id)
        .ok_or_else(|| GatewayError::InvalidPlan(plan_id.to_string()))
}

/// Order as seen by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
struct OrderCreate<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError>;
    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError>;
}

/// Razorpay Orders API over basic auth.
pub struct RazorpayGateway {
    client: wreq::Client,
    base_url: String,
    authorization: String,
}

impl RazorpayGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, wreq::Error> {
        let client = wreq::Client::builder().build()?;
        let credentials = STANDARD.encode(format!("{}:{}", config.key_id, config.key_secret));
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_RAZORPAY_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            authorization: format!("Basic {credentials}"),
        })
    }

    async fn read_order(&self, resp: wreq::Response) -> Result<GatewayOrder, GatewayError> {
        let status = resp.status();
        let body = resp.bytes().await.map_err(gateway_error)?;
        if !status.is_success() {
            return Err(GatewayError::PaymentGateway(format!(
                "razorpay returned {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )));
        }
        serde_json::from_slice(&body).map_err(gateway_error)
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let body = serde_json::to_vec(&OrderCreate {
            amount: amount_minor,
            currency,
            receipt,
        })
        .map_err(gateway_error)?;
        let resp = self
            .client
            .post(format!("{}/orders", self.base_url))
            .header(AUTHORIZATION, self.authorization.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(gateway_error)?;
        self.read_order(resp).await
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/orders/{order_id}", self.base_url))
            .header(AUTHORIZATION, self.authorization.as_str())
            .send()
            .await
            .map_err(gateway_error)?;
        self.read_order(resp).await
    }
}

fn gateway_error(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::PaymentGateway(err.to_string())
}

/// Checks Razorpay's checkout signature: hex HMAC-SHA256 of `order_id|payment_id`.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    expected.as_bytes().ct_eq(signature.trim().as_bytes()).into()
}

pub struct PaymentService {
    enabled: bool,
    key_secret: String,
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
}

impl PaymentService {
    pub fn new(
        config: &PaymentConfig,
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStore>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            key_secret: config.key_secret.clone(),
            gateway,
            store,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn ensure_enabled(&self) -> Result<(), GatewayError> {
        if self.enabled {
            Ok(())
        } else {
            Err(GatewayError::PaymentDisabled)
        }
    }

    pub async fn create_order(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<CreateOrderResponse, GatewayError> {
        self.ensure_enabled()?;
        let plan = plan(plan_id)?;
        let amount_minor = plan.price * 100;
        let order = self
            .gateway
            .create_order(amount_minor, CURRENCY, plan.id)
            .await?;
        self.store
            .record_order(NewOrder {
                order_id: order.id.clone(),
                plan_id: plan.id.to_string(),
                customer_id: user_id.to_string(),
                amount_minor,
                currency: CURRENCY.to_string(),
                receipt: plan.id.to_string(),
            })
            .await?;
        info!(
            event = "order_created",
            user_id = %user_id,
            order_id = %order.id,
            plan_id = %plan.id,
            amount_minor
        );
        Ok(CreateOrderResponse {
            order_id: order.id,
            amount: plan.price,
            currency: CURRENCY.to_string(),
            receipt: plan.id.to_string(),
        })
    }

    /// Grants the plan's generations once per payment id.
    pub async fn verify_payment(
        &self,
        user_id: &str,
        request: PaymentRequest,
    ) -> Result<PaymentStatusResponse, GatewayError> {
        self.ensure_enabled()?;
        let PaymentRequest {
            razorpay_order_id: order_id,
            razorpay_payment_id: payment_id,
            razorpay_signature: signature,
        } = request;

        if self.store.payment_exists(&payment_id).await? {
            return Err(GatewayError::DuplicatePayment(payment_id));
        }
        if !verify_signature(&self.key_secret, &order_id, &payment_id, &signature) {
            warn!(
                event = "payment_signature_rejected",
                user_id = %user_id,
                order_id = %order_id,
                payment_id = %payment_id
            );
            return Err(GatewayError::InvalidSignature);
        }

        let order = self
            .store
            .order(&order_id)
            .await?
            .ok_or(GatewayError::NotFound("order"))?;
        if order.customer_id != user_id {
            return Err(GatewayError::Forbidden);
        }
        let plan = plan(&order.plan_id)?;

        let remote = self.gateway.fetch_order(&order_id).await?;
        if remote.status != CAPTURED_STATUS {
            return Err(GatewayError::PaymentNotCaptured);
        }

        let balance = self
            .store
            .settle_payment(NewPayment {
                payment_id: payment_id.clone(),
                order_id: order_id.clone(),
                customer_id: user_id.to_string(),
                plan_id: Some(plan.id.to_string()),
                generations: plan.generations,
            })
            .await?;
        info!(
            event = "payment_settled",
            user_id = %user_id,
            order_id = %order_id,
            payment_id = %payment_id,
            generations = plan.generations,
            balance
        );
        Ok(PaymentStatusResponse {
            status: "success".to_string(),
        })
    }

    pub async fn payments(&self, user_id: &str) -> Result<Vec<PaymentView>, GatewayError> {
        let rows = self.store.list_payments(user_id).await?;
        Ok(rows.into_iter().map(view).collect())
    }

    pub async fn payment(
        &self,
        user_id: &str,
        payment_id: &str,
    ) -> Result<PaymentView, GatewayError> {
        self.store
            .payment(payment_id, user_id)
            .await?
            .map(view)
            .ok_or(GatewayError::NotFound("payment"))
    }
}

fn view(record: PaymentRecord) -> PaymentView {
    PaymentView {
        order_id: record.order_id,
        payment_id: record.payment_id,
        customer_id: record.customer_id,
        plan_id: record.plan_id,
        generations: record.generations,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, message: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signature_matches_order_pipe_payment() {
        let signature = sign("s3cret", "order_1|pay_1");
        assert!(verify_signature("s3cret", "order_1", "pay_1", &signature));
        assert!(!verify_signature("s3cret", "order_1", "pay_2", &signature));
        assert!(!verify_signature("other", "order_1", "pay_1", &signature));
        assert!(!verify_signature("s3cret", "order_1", "pay_1", ""));
    }

    #[test]
    fn plans_resolve_by_id() {
        assert_eq!(plan("plan_150").unwrap().generations, 150);
        assert_eq!(plan("plan_300").unwrap().price, 1799);
        assert!(matches!(plan("plan_999"), Err(GatewayError::InvalidPlan(_))));
    }
}
