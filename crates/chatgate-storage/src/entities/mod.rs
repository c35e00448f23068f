pub mod exchange_entries;
pub mod exchanges;
pub mod orders;
pub mod payments;
pub mod quotas;

pub use exchange_entries::Entity as ExchangeEntries;
pub use exchanges::Entity as Exchanges;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use quotas::Entity as Quotas;
