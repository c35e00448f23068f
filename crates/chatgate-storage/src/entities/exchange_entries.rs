use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "exchange_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub exchange_id: String,
    #[sea_orm(column_type = "Text")]
    pub user_message: String,
    #[sea_orm(column_type = "Text")]
    pub ai_message: String,
    pub regenerate: bool,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// Nano-USD.
    pub cost_nanos: i64,
    pub created_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "exchange_id", to = "id", on_delete = "Cascade")]
    pub exchange: HasOne<super::exchanges::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
