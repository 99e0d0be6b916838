//! Reconciliation engine: interprets one feed event and applies the derived
//! ledger mutation inside the same transaction as the event insert.

use chrono::Utc;
use tracing::{debug, warn};

use itemvault_ledger::{EventKind, FeedEvent, TradeKind, TradePayload, TradeState};

use crate::relay::{NotificationRelay, TradeUpdate};
use crate::store::{Applied, LedgerStore, StoreError};

/// Applies feed events to the event log and item ledger.
#[derive(Debug)]
pub struct Reconciler<S, R> {
    store: S,
    relay: R,
}

impl<S, R> Reconciler<S, R>
where
    S: LedgerStore,
    R: NotificationRelay,
{
    pub fn new(store: S, relay: R) -> Self {
        Self { store, relay }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record one event and apply its derived ledger mutation atomically.
    ///
    /// A trade event that is a completed deposit creates one `owned` item
    /// row per deposited asset. Every other event — other trade states, bot
    /// lifecycle events, shapes this version does not know — is recorded
    /// with no ledger mutation. A persistence failure is escalated to the
    /// caller; the consumer treats it as fatal so the checkpoint never
    /// advances past an unapplied event.
    pub async fn apply(&self, event: &FeedEvent) -> Result<Applied, StoreError> {
        let now = Utc::now();

        let (applied, trade) = match event.kind {
            EventKind::Trade => match TradePayload::from_value(&event.data) {
                Ok(trade) => {
                    let applied = if trade.kind == TradeKind::Deposit
                        && trade.state == TradeState::Complete
                    {
                        debug!(event_id = %event.id, owner = %trade.owner, items = trade.items.len(), "completed deposit");
                        self.store
                            .record_deposit(event, trade.owner, &trade.items, now)
                            .await?
                    } else {
                        self.store.record_event(event, now).await?
                    };
                    (applied, Some(trade))
                }
                Err(err) => {
                    // Forward-compatible: an undecodable trade payload is
                    // still recorded, just without interpretation.
                    warn!(event_id = %event.id, error = %err, "trade payload did not decode; recording raw");
                    (self.store.record_event(event, now).await?, None)
                }
            },
            _ => (self.store.record_event(event, now).await?, None),
        };

        // Post-commit, best-effort: a relay failure never fails the apply.
        if applied == Applied::Committed {
            if let Some(trade) = trade {
                let owner = trade.owner;
                let update = TradeUpdate {
                    event_id: event.id,
                    trade,
                };
                if self.relay.publish(owner, update).is_err() {
                    warn!(event_id = %event.id, owner = %owner, "trade notification dropped");
                }
            }
        }

        Ok(applied)
    }
}
