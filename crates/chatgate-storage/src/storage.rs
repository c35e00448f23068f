use async_trait::async_trait;
use time::OffsetDateTime;

pub type StorageResult<T> = Result<T, StorageError>;

/// Remaining generations granted to a user the first time they are seen.
pub const DEFAULT_GENERATIONS: i64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("exchange {exchange_id} belongs to another user")]
    OwnerMismatch { exchange_id: String },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("payment {0} was already recorded")]
    DuplicatePayment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRecord {
    pub id: String,
    pub owner_id: String,
    pub model: String,
    pub title: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub user_message: String,
    pub ai_message: String,
    pub regenerate: bool,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_nanos: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub exchange_id: String,
    pub user_message: String,
    pub ai_message: String,
    pub regenerate: bool,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_nanos: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_id: String,
    pub plan_id: String,
    pub customer_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub order_id: String,
    pub plan_id: String,
    pub customer_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub payment_id: String,
    pub order_id: String,
    pub customer_id: String,
    pub plan_id: Option<String>,
    pub generations: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub order_id: String,
    pub customer_id: String,
    pub plan_id: Option<String>,
    pub generations: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Per-user remaining-generation counter. Every mutation is relative.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Creates the record with [`DEFAULT_GENERATIONS`] on first read.
    async fn remaining(&self, user_id: &str) -> StorageResult<i64>;
    /// Takes one unit iff at least one remains. Returns whether it did.
    async fn decrement_one(&self, user_id: &str) -> StorageResult<bool>;
    /// Returns a unit taken by [`QuotaLedger::decrement_one`].
    async fn refund_one(&self, user_id: &str) -> StorageResult<()>;
    /// Adds `generations` and returns the new balance.
    async fn grant(&self, user_id: &str, generations: i64) -> StorageResult<i64>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn exchange_owner(&self, exchange_id: &str) -> StorageResult<Option<String>>;
    /// Creates or touches the exchange and appends one entry atomically.
    /// A missing id gets a fresh UUIDv7. Returns the exchange id.
    async fn record_exchange(
        &self,
        exchange_id: Option<String>,
        owner_id: &str,
        entry: NewEntry,
    ) -> StorageResult<String>;
    /// Newest-updated first; `page` starts at 1.
    async fn list_exchanges(
        &self,
        owner_id: &str,
        page: u64,
        limit: u64,
    ) -> StorageResult<Vec<ExchangeRecord>>;
    /// Entries in insertion order. `NotFound` when absent or not owned.
    async fn entries(&self, exchange_id: &str, owner_id: &str) -> StorageResult<Vec<EntryRecord>>;
    async fn set_title(&self, exchange_id: &str, owner_id: &str, title: &str) -> StorageResult<()>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn record_order(&self, order: NewOrder) -> StorageResult<()>;
    async fn order(&self, order_id: &str) -> StorageResult<Option<OrderRecord>>;
    async fn payment_exists(&self, payment_id: &str) -> StorageResult<bool>;
    /// Inserts the payment and grants its generations in one transaction.
    /// Returns the customer's new balance.
    async fn settle_payment(&self, payment: NewPayment) -> StorageResult<i64>;
    /// Newest first.
    async fn list_payments(&self, customer_id: &str) -> StorageResult<Vec<PaymentRecord>>;
    async fn payment(&self, payment_id: &str, customer_id: &str)
    -> StorageResult<Option<PaymentRecord>>;
}
