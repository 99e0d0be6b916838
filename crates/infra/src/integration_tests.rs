//! Integration tests for the ingestion and withdrawal pipelines.
//!
//! Everything runs against the in-memory gateway, which gives the same
//! atomicity guarantees as the Postgres implementation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde_json::json;

use itemvault_core::{AccountId, AssetId, EventId, ItemId, OwnerId};
use itemvault_ledger::{EventKind, FeedEvent, Item, ItemState, NewItem};

use crate::client::{
    ClientError, EventFeed, EventStream, InventoryAsset, TradeFilter, TradeRecord, TradingClient,
};
use crate::consumer::FeedConsumer;
use crate::reconcile::Reconciler;
use crate::relay::InMemoryRelay;
use crate::store::{Applied, InMemoryLedgerStore, LedgerStore, StoreError};
use crate::withdraw::{WithdrawalCoordinator, WithdrawalError};

fn owner() -> OwnerId {
    OwnerId::from_account(AccountId::new(39734272))
}

fn other_owner() -> OwnerId {
    OwnerId::from_account(AccountId::new(1))
}

fn owner_link() -> String {
    "https://trade.example.com/tradeoffer/new/?partner=39734272&token=t0k3n".to_string()
}

fn deposit_event(id: i64, owner: OwnerId, item_ids: &[i64]) -> FeedEvent {
    let items: Vec<_> = item_ids
        .iter()
        .map(|item_id| {
            json!({
                "id": item_id,
                "name": format!("Item #{item_id}"),
                "quality": "FN",
                "priced_value": "10.00"
            })
        })
        .collect();

    FeedEvent {
        id: EventId::new(id),
        kind: EventKind::Trade,
        action: "updated".to_string(),
        data: json!({
            "type": "deposit",
            "state": "complete",
            "user_id": owner.to_string(),
            "items": items,
        }),
    }
}

fn bot_event(id: i64) -> FeedEvent {
    FeedEvent {
        id: EventId::new(id),
        kind: EventKind::Bot,
        action: "online".to_string(),
        data: json!({"bot_id": 4}),
    }
}

/// Trading client double: records withdrawal calls, optionally fails them.
#[derive(Debug, Default)]
struct RecordingClient {
    withdrawals: Mutex<Vec<(String, Vec<ItemId>)>>,
    fail_withdrawals: AtomicBool,
}

#[async_trait]
impl TradingClient for RecordingClient {
    async fn load_inventory(&self, _owner: OwnerId) -> Result<Vec<InventoryAsset>, ClientError> {
        Ok(vec![])
    }

    async fn create_deposit(
        &self,
        _trade_link: &str,
        _asset_ids: &[AssetId],
    ) -> Result<(), ClientError> {
        Ok(())
    }

    async fn create_withdrawal(
        &self,
        trade_link: &str,
        item_ids: &[ItemId],
    ) -> Result<(), ClientError> {
        if self.fail_withdrawals.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 502,
                body: "bot unavailable".to_string(),
            });
        }
        self.withdrawals
            .lock()
            .unwrap()
            .push((trade_link.to_string(), item_ids.to_vec()));
        Ok(())
    }

    async fn list_trades(&self, _filter: &TradeFilter) -> Result<Vec<TradeRecord>, ClientError> {
        Ok(vec![])
    }
}

/// Feed double: each open_stream call pops the next scripted batch and
/// records the checkpoint it was asked to resume from.
#[derive(Debug, Default)]
struct ScriptedFeed {
    batches: Mutex<VecDeque<Vec<FeedEvent>>>,
    opens: Mutex<Vec<EventId>>,
}

impl ScriptedFeed {
    fn with_batches(batches: Vec<Vec<FeedEvent>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            opens: Mutex::new(vec![]),
        }
    }

    fn opened_after(&self) -> Vec<EventId> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventFeed for ScriptedFeed {
    async fn open_stream(&self, after: EventId) -> Result<EventStream, ClientError> {
        self.opens.lock().unwrap().push(after);
        let batch = self.batches.lock().unwrap().pop_front().unwrap_or_default();
        Ok(futures_util::stream::iter(batch.into_iter().map(Ok::<FeedEvent, ClientError>)).boxed())
    }
}

/// Gateway double whose mutations always fail.
#[derive(Debug)]
struct FailingStore;

fn injected() -> StoreError {
    StoreError::Query {
        operation: "insert_event",
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl LedgerStore for FailingStore {
    async fn max_event_id(&self) -> Result<EventId, StoreError> {
        Ok(EventId::new(0))
    }

    async fn record_event(
        &self,
        _event: &FeedEvent,
        _received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        Err(injected())
    }

    async fn record_deposit(
        &self,
        _event: &FeedEvent,
        _owner: OwnerId,
        _items: &[NewItem],
        _received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        Err(injected())
    }

    async fn claim_items(&self, _owner: OwnerId, _item_ids: &[ItemId]) -> Result<(), StoreError> {
        Err(injected())
    }

    async fn items_for_owner(
        &self,
        _owner: OwnerId,
        _state: ItemState,
    ) -> Result<Vec<Item>, StoreError> {
        Ok(vec![])
    }
}

async fn seed_items(store: &Arc<InMemoryLedgerStore>, event_id: i64, owner: OwnerId, ids: &[i64]) {
    let reconciler = Reconciler::new(store.clone(), Arc::new(InMemoryRelay::new()));
    let applied = reconciler
        .apply(&deposit_event(event_id, owner, ids))
        .await
        .unwrap();
    assert_eq!(applied, Applied::Committed);
}

#[tokio::test]
async fn completed_deposit_creates_one_owned_item_per_asset() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let reconciler = Reconciler::new(store.clone(), Arc::new(InMemoryRelay::new()));

    let applied = reconciler
        .apply(&deposit_event(10, owner(), &[1, 2, 3]))
        .await
        .unwrap();

    assert_eq!(applied, Applied::Committed);
    assert_eq!(store.max_event_id().await.unwrap(), EventId::new(10));
    for id in [1, 2, 3] {
        let item = store.item(ItemId::new(id)).unwrap();
        assert_eq!(item.state, ItemState::Owned);
        assert_eq!(item.owner, owner());
    }
}

#[tokio::test]
async fn replayed_events_are_no_ops() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let reconciler = Reconciler::new(store.clone(), Arc::new(InMemoryRelay::new()));

    let event = deposit_event(10, owner(), &[1, 2]);
    assert_eq!(reconciler.apply(&event).await.unwrap(), Applied::Committed);
    // Redelivery within a live session, or replay after restart.
    assert_eq!(
        reconciler.apply(&event).await.unwrap(),
        Applied::AlreadyRecorded
    );

    assert_eq!(store.event_count(), 1);
    let owned = store
        .items_for_owner(owner(), ItemState::Owned)
        .await
        .unwrap();
    assert_eq!(owned.len(), 2);
}

#[tokio::test]
async fn non_deposit_events_are_recorded_without_ledger_mutation() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let reconciler = Reconciler::new(store.clone(), Arc::new(InMemoryRelay::new()));

    reconciler.apply(&bot_event(1)).await.unwrap();

    // The raw event is kept intact, not just counted.
    let recorded = store.recorded(EventId::new(1)).unwrap();
    assert_eq!(recorded.kind, "bots");
    assert_eq!(recorded.action, "online");
    assert_eq!(recorded.data, json!({"bot_id": 4}));
    assert!(recorded.received_at <= Utc::now());

    // A pending (not complete) deposit must not create items.
    let mut pending = deposit_event(2, owner(), &[9]);
    pending.data["state"] = json!("pending");
    reconciler.apply(&pending).await.unwrap();

    // Unknown event kinds are recorded, not rejected.
    let unknown = FeedEvent {
        id: EventId::new(3),
        kind: EventKind::Other("promotions".to_string()),
        action: "created".to_string(),
        data: json!({}),
    };
    reconciler.apply(&unknown).await.unwrap();

    assert_eq!(store.event_count(), 3);
    assert_eq!(store.max_event_id().await.unwrap(), EventId::new(3));
    assert!(store.item(ItemId::new(9)).is_none());
}

#[tokio::test]
async fn consumer_resumes_strictly_after_the_checkpoint() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let feed = Arc::new(ScriptedFeed::with_batches(vec![
        vec![deposit_event(1, owner(), &[1]), bot_event(2)],
        vec![bot_event(3)],
    ]));
    let consumer = FeedConsumer::new(
        Reconciler::new(store.clone(), Arc::new(InMemoryRelay::new())),
        feed.clone(),
    );

    consumer.run_once().await.unwrap();
    // Simulated reconnect: the next open must resume after the largest
    // committed id, not re-request from zero.
    consumer.run_once().await.unwrap();

    assert_eq!(
        feed.opened_after(),
        vec![EventId::new(0), EventId::new(2)]
    );
    assert_eq!(store.max_event_id().await.unwrap(), EventId::new(3));
}

#[tokio::test]
async fn consumer_stops_on_persistence_failure() {
    let feed = Arc::new(ScriptedFeed::with_batches(vec![vec![bot_event(1)]]));
    let consumer = FeedConsumer::new(
        Reconciler::new(Arc::new(FailingStore), Arc::new(InMemoryRelay::new())),
        feed,
    );

    let err = consumer.run_once().await.unwrap_err();
    assert!(matches!(err, StoreError::Query { .. }));
}

#[tokio::test]
async fn trade_notifications_reach_the_owners_subscription() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let relay = Arc::new(InMemoryRelay::new());
    let reconciler = Reconciler::new(store, relay.clone());

    let sub = relay.subscribe(owner());
    let other_sub = relay.subscribe(other_owner());

    reconciler
        .apply(&deposit_event(7, owner(), &[1]))
        .await
        .unwrap();

    let update = sub.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(update.event_id, EventId::new(7));
    assert!(other_sub.try_recv().is_err());
}

#[tokio::test]
async fn withdrawal_transitions_claimed_items_and_requests_fulfillment() {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed_items(&store, 1, owner(), &[1, 2]).await;

    let client = Arc::new(RecordingClient::default());
    let coordinator = WithdrawalCoordinator::new(store.clone(), client.clone());

    let ids = [ItemId::new(1), ItemId::new(2)];
    coordinator
        .request_withdrawal(owner(), &owner_link(), &ids)
        .await
        .unwrap();

    for id in ids {
        assert_eq!(store.item(id).unwrap().state, ItemState::Requested);
    }
    let calls = client.withdrawals.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, ids.to_vec());
}

#[tokio::test]
async fn withdrawal_is_all_or_nothing() {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed_items(&store, 1, owner(), &[1, 2]).await;
    seed_items(&store, 2, other_owner(), &[3]).await;

    let client = Arc::new(RecordingClient::default());
    let coordinator = WithdrawalCoordinator::new(store.clone(), client.clone());

    // One id missing entirely.
    let err = coordinator
        .request_withdrawal(owner(), &owner_link(), &[ItemId::new(1), ItemId::new(99)])
        .await
        .unwrap_err();
    assert!(matches!(err, WithdrawalError::Unavailable));

    // One id owned by someone else.
    let err = coordinator
        .request_withdrawal(owner(), &owner_link(), &[ItemId::new(1), ItemId::new(3)])
        .await
        .unwrap_err();
    assert!(matches!(err, WithdrawalError::Unavailable));

    // No row changed state and no fulfillment was requested.
    assert_eq!(store.item(ItemId::new(1)).unwrap().state, ItemState::Owned);
    assert_eq!(store.item(ItemId::new(2)).unwrap().state, ItemState::Owned);
    assert_eq!(store.item(ItemId::new(3)).unwrap().state, ItemState::Owned);
    assert!(client.withdrawals.lock().unwrap().is_empty());
}

#[tokio::test]
async fn already_requested_items_cannot_be_claimed_again() {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed_items(&store, 1, owner(), &[1]).await;

    let client = Arc::new(RecordingClient::default());
    let coordinator = WithdrawalCoordinator::new(store.clone(), client.clone());

    coordinator
        .request_withdrawal(owner(), &owner_link(), &[ItemId::new(1)])
        .await
        .unwrap();

    let err = coordinator
        .request_withdrawal(owner(), &owner_link(), &[ItemId::new(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, WithdrawalError::Unavailable));
}

#[tokio::test]
async fn concurrent_overlapping_withdrawals_have_exactly_one_winner() {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed_items(&store, 1, owner(), &[1, 2]).await;

    let client = Arc::new(RecordingClient::default());
    let coordinator = Arc::new(WithdrawalCoordinator::new(store.clone(), client.clone()));

    let ids = [ItemId::new(1), ItemId::new(2)];
    let link = owner_link();
    let (a, b) = tokio::join!(
        coordinator.request_withdrawal(owner(), &link, &ids),
        coordinator.request_withdrawal(owner(), &link, &ids),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser.unwrap_err(), WithdrawalError::Unavailable));

    // The winner's transition stuck; only one fulfillment call went out.
    for id in ids {
        assert_eq!(store.item(id).unwrap().state, ItemState::Requested);
    }
    assert_eq!(client.withdrawals.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn fulfillment_failure_leaves_items_requested() {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed_items(&store, 1, owner(), &[1]).await;

    let client = Arc::new(RecordingClient::default());
    client.fail_withdrawals.store(true, Ordering::SeqCst);
    let coordinator = WithdrawalCoordinator::new(store.clone(), client);

    let err = coordinator
        .request_withdrawal(owner(), &owner_link(), &[ItemId::new(1)])
        .await
        .unwrap_err();

    assert!(matches!(err, WithdrawalError::Fulfillment(_)));
    // Committed claim is not reverted; recovery is manual.
    assert_eq!(
        store.item(ItemId::new(1)).unwrap().state,
        ItemState::Requested
    );
}

#[tokio::test]
async fn withdrawal_validation_happens_before_any_mutation() {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed_items(&store, 1, owner(), &[1]).await;

    let client = Arc::new(RecordingClient::default());
    let coordinator = WithdrawalCoordinator::new(store.clone(), client.clone());

    let err = coordinator
        .request_withdrawal(owner(), &owner_link(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, WithdrawalError::EmptySelection));

    // Someone else's trade link.
    let foreign = "https://trade.example.com/tradeoffer/new/?partner=1&token=t";
    let err = coordinator
        .request_withdrawal(owner(), foreign, &[ItemId::new(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, WithdrawalError::InvalidTradeLink));

    assert_eq!(store.item(ItemId::new(1)).unwrap().state, ItemState::Owned);
    assert!(client.withdrawals.lock().unwrap().is_empty());
}
