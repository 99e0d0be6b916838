//! Infrastructure: the persistence gateway, the external trading service
//! ports, and the application services built on them (event stream
//! consumer, reconciliation engine, withdrawal coordinator, notification
//! relay).

pub mod client;
pub mod consumer;
pub mod reconcile;
pub mod relay;
pub mod store;
pub mod withdraw;

#[cfg(test)]
mod integration_tests;

pub use client::{
    ClientError, EventFeed, EventStream, HttpTradingService, InventoryAsset, TradeFilter,
    TradeRecord, TradingClient,
};
pub use consumer::FeedConsumer;
pub use reconcile::Reconciler;
pub use relay::{InMemoryRelay, NotificationRelay, RelayError, Subscription, TradeUpdate};
pub use store::{
    Applied, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, RecordedEvent, StoreError,
};
pub use withdraw::{WithdrawalCoordinator, WithdrawalError};
