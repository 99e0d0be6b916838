//! Notification relay: best-effort fan-out of trade-state changes to
//! subscribed user sessions.
//!
//! Delivery is keyed by owner identity and carries no persistence or replay
//! guarantee; a message published with no subscribers is silently dropped.
//! Publication happens outside the reconciliation transaction and its
//! failure never affects the write path.

use std::collections::HashMap;
use std::sync::{mpsc, Mutex};
use std::time::Duration;

use itemvault_core::{EventId, OwnerId};
use itemvault_ledger::TradePayload;

/// A trade-state change pushed to an owner's sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeUpdate {
    pub event_id: EventId,
    pub trade: TradePayload,
}

/// A subscription to one owner's updates.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: mpsc::Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn try_recv(&self) -> Result<M, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

#[derive(Debug)]
pub enum RelayError {
    /// Internal lock poisoning; the message was dropped.
    Poisoned,
}

/// Owner-keyed pub/sub relay.
pub trait NotificationRelay: Send + Sync {
    /// Deliver `update` to zero or more sessions subscribed to `owner`.
    fn publish(&self, owner: OwnerId, update: TradeUpdate) -> Result<(), RelayError>;
}

impl<R> NotificationRelay for std::sync::Arc<R>
where
    R: NotificationRelay + ?Sized,
{
    fn publish(&self, owner: OwnerId, update: TradeUpdate) -> Result<(), RelayError> {
        (**self).publish(owner, update)
    }
}

/// In-process relay.
///
/// - No IO / no async
/// - Best-effort fan-out per owner
/// - Dead subscribers are dropped on publish
#[derive(Debug, Default)]
pub struct InMemoryRelay {
    topics: Mutex<HashMap<OwnerId, Vec<mpsc::Sender<TradeUpdate>>>>,
}

impl InMemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for one owner's updates.
    pub fn subscribe(&self, owner: OwnerId) -> Subscription<TradeUpdate> {
        let (tx, rx) = mpsc::channel();

        // On a poisoned lock the subscription is still returned; it just
        // never receives messages.
        if let Ok(mut topics) = self.topics.lock() {
            topics.entry(owner).or_default().push(tx);
        }

        Subscription::new(rx)
    }
}

impl NotificationRelay for InMemoryRelay {
    fn publish(&self, owner: OwnerId, update: TradeUpdate) -> Result<(), RelayError> {
        let mut topics = self.topics.lock().map_err(|_| RelayError::Poisoned)?;

        if let Some(subs) = topics.get_mut(&owner) {
            subs.retain(|tx| tx.send(update.clone()).is_ok());
            if subs.is_empty() {
                topics.remove(&owner);
            }
        }

        Ok(())
    }
}
