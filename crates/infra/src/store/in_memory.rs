//! In-memory persistence gateway for tests/dev.
//!
//! A single mutex stands in for the database's transaction isolation: every
//! operation runs to completion under the lock, so the atomicity and
//! all-or-nothing claim semantics match the Postgres implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use itemvault_core::{EventId, ItemId, OwnerId};
use itemvault_ledger::{FeedEvent, Item, ItemState, NewItem};

use super::r#trait::{Applied, LedgerStore, StoreError};

/// An event as the in-memory log stores it, readable through
/// [`InMemoryLedgerStore::recorded`] so tests can assert on what was kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub kind: String,
    pub action: String,
    pub data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    events: BTreeMap<EventId, RecordedEvent>,
    items: HashMap<ItemId, Item>,
}

/// In-memory gateway. Not optimized; intended for tests and local dev.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: look up a single item.
    pub fn item(&self, id: ItemId) -> Option<Item> {
        self.lock().ok()?.items.get(&id).cloned()
    }

    /// Test hook: look up a recorded event.
    pub fn recorded(&self, id: EventId) -> Option<RecordedEvent> {
        self.lock().ok()?.events.get(&id).cloned()
    }

    /// Test hook: number of recorded events.
    pub fn event_count(&self) -> usize {
        self.lock().map(|g| g.events.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Query {
            operation: "lock",
            message: "store mutex poisoned".to_string(),
        })
    }

    fn insert_event(
        inner: &mut Inner,
        event: &FeedEvent,
        received_at: DateTime<Utc>,
    ) -> Applied {
        if inner.events.contains_key(&event.id) {
            return Applied::AlreadyRecorded;
        }
        inner.events.insert(
            event.id,
            RecordedEvent {
                kind: event.kind.as_str().to_string(),
                action: event.action.clone(),
                data: event.data.clone(),
                received_at,
            },
        );
        Applied::Committed
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn max_event_id(&self) -> Result<EventId, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .events
            .keys()
            .next_back()
            .copied()
            .unwrap_or(EventId::new(0)))
    }

    async fn record_event(
        &self,
        event: &FeedEvent,
        received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        let mut inner = self.lock()?;
        Ok(Self::insert_event(&mut inner, event, received_at))
    }

    async fn record_deposit(
        &self,
        event: &FeedEvent,
        owner: OwnerId,
        items: &[NewItem],
        received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        let mut inner = self.lock()?;

        if Self::insert_event(&mut inner, event, received_at) == Applied::AlreadyRecorded {
            return Ok(Applied::AlreadyRecorded);
        }

        // Mirror the primary-key constraint: a duplicate item id would have
        // aborted the Postgres transaction, so fail before mutating.
        if let Some(dup) = items.iter().find(|i| inner.items.contains_key(&i.id)) {
            inner.events.remove(&event.id);
            return Err(StoreError::Conflict(format!(
                "item {} already exists",
                dup.id
            )));
        }

        for item in items {
            inner.items.insert(
                item.id,
                Item {
                    id: item.id,
                    state: ItemState::Owned,
                    owner,
                    name: item.name.clone(),
                    quality: item.quality.clone(),
                    icon: item.icon.clone(),
                    inspect_link: item.inspect_link.clone(),
                    priced_value: item.priced_value,
                    created_at: received_at,
                    updated_at: received_at,
                },
            );
        }

        Ok(Applied::Committed)
    }

    async fn claim_items(&self, owner: OwnerId, item_ids: &[ItemId]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        // Distinct ids only, like `ANY(...)` row locking: a duplicated id in
        // the request matches one row, not two.
        let lockable = item_ids
            .iter()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .filter(|id| {
                inner
                    .items
                    .get(id)
                    .is_some_and(|i| i.owner == owner && i.state == ItemState::Owned)
            })
            .count();

        if lockable != item_ids.len() {
            return Err(StoreError::InsufficientItems {
                requested: item_ids.len(),
                lockable,
            });
        }

        let now = Utc::now();
        for id in item_ids {
            if let Some(item) = inner.items.get_mut(id) {
                item.state = ItemState::Requested;
                item.updated_at = now;
            }
        }

        Ok(())
    }

    async fn items_for_owner(
        &self,
        owner: OwnerId,
        state: ItemState,
    ) -> Result<Vec<Item>, StoreError> {
        let inner = self.lock()?;
        let mut items: Vec<Item> = inner
            .items
            .values()
            .filter(|i| i.owner == owner && i.state == state)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.priced_value.cmp(&a.priced_value).then(a.id.cmp(&b.id)));
        Ok(items)
    }
}
