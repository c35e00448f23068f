use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use chatgate_common::PaymentConfig;
use chatgate_core::{GatewayError, GatewayOrder, PaymentGateway, PaymentService};
use chatgate_protocol::payment::PaymentRequest;
use chatgate_storage::{DEFAULT_GENERATIONS, QuotaLedger, SeaOrmStore};

const SECRET: &str = "rzp_secret";

/// Hands out sequential order ids and reports whatever status the test sets.
struct FakeGateway {
    status: Mutex<String>,
    created: Mutex<Vec<(i64, String, String)>>,
}

impl FakeGateway {
    fn new(status: &str) -> Self {
        Self {
            status: Mutex::new(status.to_string()),
            created: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let mut created = self.created.lock().unwrap();
        created.push((amount_minor, currency.to_string(), receipt.to_string()));
        Ok(GatewayOrder {
            id: format!("order_{}", created.len()),
            amount: amount_minor,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: "created".to_string(),
        })
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        Ok(GatewayOrder {
            id: order_id.to_string(),
            amount: 0,
            currency: "INR".to_string(),
            receipt: None,
            status: self.status.lock().unwrap().clone(),
        })
    }
}

async fn setup(
    enabled: bool,
    status: &str,
) -> (PaymentService, Arc<FakeGateway>, Arc<SeaOrmStore>) {
    let store = SeaOrmStore::connect("sqlite::memory:").await.unwrap();
    store.sync().await.unwrap();
    let store = Arc::new(store);
    let gateway = Arc::new(FakeGateway::new(status));
    let config = PaymentConfig {
        enabled,
        key_id: "rzp_key".to_string(),
        key_secret: SECRET.to_string(),
        base_url: None,
    };
    let service = PaymentService::new(&config, gateway.clone(), store.clone());
    (service, gateway, store)
}

fn signed(order_id: &str, payment_id: &str) -> PaymentRequest {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    PaymentRequest {
        razorpay_order_id: order_id.to_string(),
        razorpay_payment_id: payment_id.to_string(),
        razorpay_signature: hex::encode(mac.finalize().into_bytes()),
    }
}

#[tokio::test]
async fn verified_payment_grants_plan_once() {
    let (service, gateway, store) = setup(true, "paid").await;

    let order = service.create_order("alice", "plan_50").await.unwrap();
    assert_eq!(order.amount, 399);
    assert_eq!(order.currency, "INR");
    assert_eq!(order.receipt, "plan_50");
    assert_eq!(
        gateway.created.lock().unwrap()[0],
        (39_900, "INR".to_string(), "plan_50".to_string())
    );

    let status = service
        .verify_payment("alice", signed(&order.order_id, "pay_1"))
        .await
        .unwrap();
    assert_eq!(status.status, "success");
    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS + 50);

    assert!(matches!(
        service.verify_payment("alice", signed(&order.order_id, "pay_1")).await,
        Err(GatewayError::DuplicatePayment(_))
    ));
    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS + 50);

    let payments = service.payments("alice").await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].plan_id.as_deref(), Some("plan_50"));
    assert_eq!(service.payment("alice", "pay_1").await.unwrap().generations, 50);
    assert!(matches!(
        service.payment("bob", "pay_1").await,
        Err(GatewayError::NotFound("payment"))
    ));
}

#[tokio::test]
async fn bad_signature_and_uncaptured_orders_grant_nothing() {
    let (service, gateway, store) = setup(true, "attempted").await;
    let order = service.create_order("alice", "plan_150").await.unwrap();

    let mut forged = signed(&order.order_id, "pay_1");
    forged.razorpay_payment_id = "pay_2".to_string();
    assert!(matches!(
        service.verify_payment("alice", forged).await,
        Err(GatewayError::InvalidSignature)
    ));

    assert!(matches!(
        service.verify_payment("alice", signed(&order.order_id, "pay_1")).await,
        Err(GatewayError::PaymentNotCaptured)
    ));

    *gateway.status.lock().unwrap() = "paid".to_string();
    assert!(matches!(
        service.verify_payment("bob", signed(&order.order_id, "pay_1")).await,
        Err(GatewayError::Forbidden)
    ));
    assert!(matches!(
        service.verify_payment("alice", signed("order_404", "pay_1")).await,
        Err(GatewayError::NotFound("order"))
    ));
    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS);
}

#[tokio::test]
async fn disabled_payments_and_unknown_plans_are_rejected() {
    let (service, _gateway, _store) = setup(false, "paid").await;
    assert!(matches!(
        service.create_order("alice", "plan_50").await,
        Err(GatewayError::PaymentDisabled)
    ));
    assert!(matches!(
        service.verify_payment("alice", signed("order_1", "pay_1")).await,
        Err(GatewayError::PaymentDisabled)
    ));

    let (service, _gateway, _store) = setup(true, "paid").await;
    assert!(matches!(
        service.create_order("alice", "plan_250").await,
        Err(GatewayError::InvalidPlan(_))
    ));
}
