//! Persistence gateway: transactional access to the append-only event log
//! and the mutable item ledger.

mod in_memory;
mod postgres;
mod r#trait;

pub use in_memory::{InMemoryLedgerStore, RecordedEvent};
pub use postgres::PostgresLedgerStore;
pub use r#trait::{Applied, LedgerStore, StoreError};
