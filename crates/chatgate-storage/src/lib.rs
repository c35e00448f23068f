pub mod entities;
mod seaorm;
mod storage;

pub use seaorm::SeaOrmStore;
pub use storage::{
    DEFAULT_GENERATIONS, EntryRecord, ExchangeRecord, HistoryStore, NewEntry, NewOrder,
    NewPayment, OrderRecord, PaymentRecord, PaymentStore, QuotaLedger, StorageError,
    StorageResult,
};
