use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use itemvault_core::{EventId, ItemId, OwnerId};
use itemvault_ledger::{FeedEvent, Item, ItemState, NewItem};

/// Outcome of recording a feed event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The event row (and any derived ledger mutation) was committed.
    Committed,
    /// The event id was already present; the whole operation was a no-op.
    /// This is how redelivered and replayed events stay idempotent.
    AlreadyRecorded,
}

/// Persistence gateway error.
///
/// These are infrastructure failures (query, lock, commit) plus the one
/// business-visible outcome the gateway itself decides: a lock-count
/// mismatch during a claim, which callers treat as a rejected request
/// rather than a fault.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A claim matched fewer lockable rows than requested. The transaction
    /// was rolled back with no mutation.
    #[error("insufficient items: requested {requested}, lockable {lockable}")]
    InsufficientItems { requested: usize, lockable: usize },

    /// A payload could not be serialized for storage.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A uniqueness constraint fired where it was not expected.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other query/lock/commit failure.
    #[error("query failed in {operation}: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },
}

/// Transactional access to the event log and the item ledger.
///
/// Each operation is one complete transaction: it either commits fully or
/// leaves no trace. Concurrency safety between a claim and an in-flight
/// deposit insert, or between two overlapping claims, is guaranteed entirely
/// by the implementation's locking (row locks in Postgres, a single mutex in
/// the in-memory double); callers hold no additional locks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Largest event id present in the log, `0` when empty. This is the
    /// feed resume checkpoint.
    async fn max_event_id(&self) -> Result<EventId, StoreError>;

    /// Record an event with no ledger mutation. Idempotent on event id.
    async fn record_event(
        &self,
        event: &FeedEvent,
        received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError>;

    /// Record a completed-deposit event and create one `owned` ledger row
    /// per deposited asset, all in one transaction. Idempotent on event id:
    /// if the event row already exists, no items are inserted.
    async fn record_deposit(
        &self,
        event: &FeedEvent,
        owner: OwnerId,
        items: &[NewItem],
        received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError>;

    /// Atomically lock the rows in `item_ids` that are `owned` by `owner`
    /// and transition them all to `requested`. If even one row is missing,
    /// owned by someone else, or already requested, nothing changes and
    /// [`StoreError::InsufficientItems`] is returned.
    async fn claim_items(&self, owner: OwnerId, item_ids: &[ItemId]) -> Result<(), StoreError>;

    /// All items for an owner in the given state.
    async fn items_for_owner(
        &self,
        owner: OwnerId,
        state: ItemState,
    ) -> Result<Vec<Item>, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn max_event_id(&self) -> Result<EventId, StoreError> {
        (**self).max_event_id().await
    }

    async fn record_event(
        &self,
        event: &FeedEvent,
        received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        (**self).record_event(event, received_at).await
    }

    async fn record_deposit(
        &self,
        event: &FeedEvent,
        owner: OwnerId,
        items: &[NewItem],
        received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        (**self)
            .record_deposit(event, owner, items, received_at)
            .await
    }

    async fn claim_items(&self, owner: OwnerId, item_ids: &[ItemId]) -> Result<(), StoreError> {
        (**self).claim_items(owner, item_ids).await
    }

    async fn items_for_owner(
        &self,
        owner: OwnerId,
        state: ItemState,
    ) -> Result<Vec<Item>, StoreError> {
        (**self).items_for_owner(owner, state).await
    }
}
