use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Index, OnConflict};
use sea_orm::{
    ActiveValue, ColumnTrait, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    EntityTrait, ExprTrait, QueryFilter, QueryOrder, QuerySelect, Schema, TransactionError,
    TransactionTrait,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::{self, exchange_entries, exchanges, orders, payments, quotas};
use crate::storage::{
    DEFAULT_GENERATIONS, EntryRecord, ExchangeRecord, HistoryStore, NewEntry, NewOrder,
    NewPayment, OrderRecord, PaymentRecord, PaymentStore, QuotaLedger, StorageError,
    StorageResult,
};

#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let db = Database::connect(dsn).await?;
        if db.get_database_backend() == DatabaseBackend::Sqlite {
            db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
        }
        Ok(Self { db })
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Entity-first schema sync, then the listing indexes.
    pub async fn sync(&self) -> StorageResult<()> {
        Schema::new(self.db.get_database_backend())
            .builder()
            .register(entities::Quotas)
            .register(entities::Exchanges)
            .register(entities::ExchangeEntries)
            .register(entities::Orders)
            .register(entities::Payments)
            .sync(&self.db)
            .await?;
        self.ensure_indexes().await
    }

    async fn ensure_indexes(&self) -> StorageResult<()> {
        let statements = vec![
            Index::create()
                .name("idx_exchanges_owner_updated")
                .table(entities::Exchanges)
                .col(exchanges::Column::OwnerId)
                .col(exchanges::Column::UpdatedAt)
                .if_not_exists()
                .to_owned(),
            Index::create()
                .name("idx_exchange_entries_exchange_id")
                .table(entities::ExchangeEntries)
                .col(exchange_entries::Column::ExchangeId)
                .col(exchange_entries::Column::Id)
                .if_not_exists()
                .to_owned(),
            Index::create()
                .name("idx_payments_customer_created")
                .table(entities::Payments)
                .col(payments::Column::CustomerId)
                .col(payments::Column::CreatedAt)
                .if_not_exists()
                .to_owned(),
        ];
        for statement in statements {
            self.db.execute(&statement).await?;
        }
        Ok(())
    }
}

fn flatten(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Connection(err) => StorageError::Db(err),
        TransactionError::Transaction(err) => err,
    }
}

async fn ensure_quota<C: ConnectionTrait>(conn: &C, user_id: &str) -> StorageResult<()> {
    let now = OffsetDateTime::now_utc();
    let active = quotas::ActiveModel {
        user_id: ActiveValue::Set(user_id.to_string()),
        remaining: ActiveValue::Set(DEFAULT_GENERATIONS),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
        ..Default::default()
    };
    entities::Quotas::insert(active)
        .on_conflict(
            OnConflict::column(quotas::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn add_generations<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    delta: i64,
) -> StorageResult<i64> {
    ensure_quota(conn, user_id).await?;
    entities::Quotas::update_many()
        .col_expr(
            quotas::Column::Remaining,
            Expr::col(quotas::Column::Remaining).add(delta),
        )
        .col_expr(quotas::Column::UpdatedAt, Expr::value(OffsetDateTime::now_utc()))
        .filter(quotas::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;
    let row = entities::Quotas::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or(StorageError::NotFound("quota"))?;
    Ok(row.remaining)
}

#[async_trait]
impl QuotaLedger for SeaOrmStore {
    async fn remaining(&self, user_id: &str) -> StorageResult<i64> {
        ensure_quota(&self.db, user_id).await?;
        let row = entities::Quotas::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(StorageError::NotFound("quota"))?;
        Ok(row.remaining)
    }

    async fn decrement_one(&self, user_id: &str) -> StorageResult<bool> {
        ensure_quota(&self.db, user_id).await?;
        let result = entities::Quotas::update_many()
            .col_expr(
                quotas::Column::Remaining,
                Expr::col(quotas::Column::Remaining).sub(1),
            )
            .col_expr(quotas::Column::UpdatedAt, Expr::value(OffsetDateTime::now_utc()))
            .filter(quotas::Column::UserId.eq(user_id))
            .filter(quotas::Column::Remaining.gt(0))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn refund_one(&self, user_id: &str) -> StorageResult<()> {
        add_generations(&self.db, user_id, 1).await?;
        Ok(())
    }

    async fn grant(&self, user_id: &str, generations: i64) -> StorageResult<i64> {
        add_generations(&self.db, user_id, generations).await
    }
}

fn exchange_record(row: exchanges::Model) -> ExchangeRecord {
    ExchangeRecord {
        id: row.id,
        owner_id: row.owner_id,
        model: row.model,
        title: row.title,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn entry_record(row: exchange_entries::Model) -> EntryRecord {
    EntryRecord {
        exchange_id: row.exchange_id,
        user_message: row.user_message,
        ai_message: row.ai_message,
        regenerate: row.regenerate,
        model: row.model,
        input_tokens: row.input_tokens,
        output_tokens: row.output_tokens,
        cost_nanos: row.cost_nanos,
        created_at: row.created_at,
    }
}

#[async_trait]
impl HistoryStore for SeaOrmStore {
    async fn exchange_owner(&self, exchange_id: &str) -> StorageResult<Option<String>> {
        let row = entities::Exchanges::find_by_id(exchange_id)
            .one(&self.db)
            .await?;
        Ok(row.map(|row| row.owner_id))
    }

    async fn record_exchange(
        &self,
        exchange_id: Option<String>,
        owner_id: &str,
        entry: NewEntry,
    ) -> StorageResult<String> {
        let exchange_id = exchange_id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let owner_id = owner_id.to_string();

        self.db
            .transaction::<_, String, StorageError>(move |txn| {
                Box::pin(async move {
                    let now = OffsetDateTime::now_utc();
                    let exchange = exchanges::ActiveModel {
                        id: ActiveValue::Set(exchange_id.clone()),
                        owner_id: ActiveValue::Set(owner_id.clone()),
                        model: ActiveValue::Set(entry.model.clone()),
                        title: ActiveValue::Set(None),
                        created_at: ActiveValue::Set(now),
                        updated_at: ActiveValue::Set(now),
                        ..Default::default()
                    };
                    entities::Exchanges::insert(exchange)
                        .on_conflict(
                            OnConflict::column(exchanges::Column::Id)
                                .do_nothing()
                                .to_owned(),
                        )
                        .exec_without_returning(txn)
                        .await?;

                    let stored = entities::Exchanges::find_by_id(exchange_id.as_str())
                        .one(txn)
                        .await?
                        .ok_or(StorageError::NotFound("exchange"))?;
                    if stored.owner_id != owner_id {
                        return Err(StorageError::OwnerMismatch { exchange_id });
                    }

                    entities::Exchanges::update_many()
                        .col_expr(exchanges::Column::Model, Expr::value(entry.model.clone()))
                        .col_expr(exchanges::Column::UpdatedAt, Expr::value(now))
                        .filter(exchanges::Column::Id.eq(exchange_id.as_str()))
                        .exec(txn)
                        .await?;

                    let row = exchange_entries::ActiveModel {
                        exchange_id: ActiveValue::Set(exchange_id.clone()),
                        user_message: ActiveValue::Set(entry.user_message),
                        ai_message: ActiveValue::Set(entry.ai_message),
                        regenerate: ActiveValue::Set(entry.regenerate),
                        model: ActiveValue::Set(entry.model),
                        input_tokens: ActiveValue::Set(entry.input_tokens),
                        output_tokens: ActiveValue::Set(entry.output_tokens),
                        cost_nanos: ActiveValue::Set(entry.cost_nanos),
                        created_at: ActiveValue::Set(now),
                        ..Default::default()
                    };
                    entities::ExchangeEntries::insert(row).exec(txn).await?;
                    Ok(exchange_id)
                })
            })
            .await
            .map_err(flatten)
    }

    async fn list_exchanges(
        &self,
        owner_id: &str,
        page: u64,
        limit: u64,
    ) -> StorageResult<Vec<ExchangeRecord>> {
        let offset = page.saturating_sub(1).saturating_mul(limit);
        let rows = entities::Exchanges::find()
            .filter(exchanges::Column::OwnerId.eq(owner_id))
            .order_by_desc(exchanges::Column::UpdatedAt)
            .order_by_desc(exchanges::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(exchange_record).collect())
    }

    async fn entries(&self, exchange_id: &str, owner_id: &str) -> StorageResult<Vec<EntryRecord>> {
        let owned = entities::Exchanges::find_by_id(exchange_id)
            .one(&self.db)
            .await?
            .is_some_and(|row| row.owner_id == owner_id);
        if !owned {
            return Err(StorageError::NotFound("exchange"));
        }
        let rows = entities::ExchangeEntries::find()
            .filter(exchange_entries::Column::ExchangeId.eq(exchange_id))
            .order_by_asc(exchange_entries::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(entry_record).collect())
    }

    async fn set_title(&self, exchange_id: &str, owner_id: &str, title: &str) -> StorageResult<()> {
        let result = entities::Exchanges::update_many()
            .col_expr(exchanges::Column::Title, Expr::value(title.to_string()))
            .filter(exchanges::Column::Id.eq(exchange_id))
            .filter(exchanges::Column::OwnerId.eq(owner_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            return Ok(());
        }
        // MySQL reports changed rows, so an unchanged title also lands here.
        match self.exchange_owner(exchange_id).await? {
            Some(owner) if owner == owner_id => Ok(()),
            Some(_) => Err(StorageError::OwnerMismatch {
                exchange_id: exchange_id.to_string(),
            }),
            None => Err(StorageError::NotFound("exchange")),
        }
    }
}

fn payment_record(row: payments::Model) -> PaymentRecord {
    PaymentRecord {
        payment_id: row.payment_id,
        order_id: row.order_id,
        customer_id: row.customer_id,
        plan_id: row.plan_id,
        generations: row.generations,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[async_trait]
impl PaymentStore for SeaOrmStore {
    async fn record_order(&self, order: NewOrder) -> StorageResult<()> {
        let active = orders::ActiveModel {
            order_id: ActiveValue::Set(order.order_id),
            plan_id: ActiveValue::Set(order.plan_id),
            customer_id: ActiveValue::Set(order.customer_id),
            amount_minor: ActiveValue::Set(order.amount_minor),
            currency: ActiveValue::Set(order.currency),
            receipt: ActiveValue::Set(order.receipt),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        entities::Orders::insert(active)
            .on_conflict(
                OnConflict::column(orders::Column::OrderId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn order(&self, order_id: &str) -> StorageResult<Option<OrderRecord>> {
        let row = entities::Orders::find_by_id(order_id).one(&self.db).await?;
        Ok(row.map(|row| OrderRecord {
            order_id: row.order_id,
            plan_id: row.plan_id,
            customer_id: row.customer_id,
            amount_minor: row.amount_minor,
            currency: row.currency,
            created_at: row.created_at,
        }))
    }

    async fn payment_exists(&self, payment_id: &str) -> StorageResult<bool> {
        let row = entities::Payments::find()
            .filter(payments::Column::PaymentId.eq(payment_id))
            .one(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn settle_payment(&self, payment: NewPayment) -> StorageResult<i64> {
        self.db
            .transaction::<_, i64, StorageError>(move |txn| {
                Box::pin(async move {
                    let now = OffsetDateTime::now_utc();
                    let active = payments::ActiveModel {
                        payment_id: ActiveValue::Set(payment.payment_id.clone()),
                        order_id: ActiveValue::Set(payment.order_id),
                        customer_id: ActiveValue::Set(payment.customer_id.clone()),
                        plan_id: ActiveValue::Set(payment.plan_id),
                        generations: ActiveValue::Set(payment.generations),
                        created_at: ActiveValue::Set(now),
                        updated_at: ActiveValue::Set(now),
                        ..Default::default()
                    };
                    let inserted = entities::Payments::insert(active)
                        .on_conflict(
                            OnConflict::column(payments::Column::PaymentId)
                                .do_nothing()
                                .to_owned(),
                        )
                        .exec_without_returning(txn)
                        .await?;
                    if inserted == 0 {
                        return Err(StorageError::DuplicatePayment(payment.payment_id));
                    }
                    add_generations(txn, &payment.customer_id, payment.generations).await
                })
            })
            .await
            .map_err(flatten)
    }

    async fn list_payments(&self, customer_id: &str) -> StorageResult<Vec<PaymentRecord>> {
        let rows = entities::Payments::find()
            .filter(payments::Column::CustomerId.eq(customer_id))
            .order_by_desc(payments::Column::CreatedAt)
            .order_by_desc(payments::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(payment_record).collect())
    }

    async fn payment(
        &self,
        payment_id: &str,
        customer_id: &str,
    ) -> StorageResult<Option<PaymentRecord>> {
        let row = entities::Payments::find()
            .filter(payments::Column::PaymentId.eq(payment_id))
            .filter(payments::Column::CustomerId.eq(customer_id))
            .one(&self.db)
            .await?;
        Ok(row.map(payment_record))
    }
}
