//! Event stream consumer: resumes the feed from the durable checkpoint and
//! applies events strictly in arrival order.

use std::time::Duration;

use futures_util::StreamExt;
use tracing::{info, warn};

use crate::client::EventFeed;
use crate::reconcile::Reconciler;
use crate::relay::NotificationRelay;
use crate::store::{LedgerStore, StoreError};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Sequential consumer of the external event feed.
///
/// One event is applied at a time; the reconciler's derived state depends on
/// ordering (a deposit's items must exist before a later withdrawal can
/// reference them), so there is no concurrency here. A persistence failure
/// stops the consumer: the failed event was never recorded, so the next
/// start resumes at it. Feed transport failures reconnect, recomputing the
/// checkpoint from the event log each time.
#[derive(Debug)]
pub struct FeedConsumer<S, R, F> {
    reconciler: Reconciler<S, R>,
    feed: F,
    reconnect_delay: Duration,
}

impl<S, R, F> FeedConsumer<S, R, F>
where
    S: LedgerStore,
    R: NotificationRelay,
    F: EventFeed,
{
    pub fn new(reconciler: Reconciler<S, R>, feed: F) -> Self {
        Self {
            reconciler,
            feed,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Consume until the process stops or a persistence failure occurs.
    pub async fn run(&self) -> Result<(), StoreError> {
        loop {
            self.run_once().await?;
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// One connection's worth of consumption: resume from the checkpoint
    /// and apply events until the feed drops. Returns `Ok(())` on a
    /// transport-level disconnect (the caller reconnects) and `Err` on a
    /// persistence failure (fatal).
    pub async fn run_once(&self) -> Result<(), StoreError> {
        let after = self.reconciler.store().max_event_id().await?;

        let mut stream = match self.feed.open_stream(after).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(after = %after, error = %err, "feed connection failed");
                return Ok(());
            }
        };

        info!(after = %after, "resuming event feed");

        while let Some(next) = stream.next().await {
            match next {
                Ok(event) => {
                    let applied = self.reconciler.apply(&event).await?;
                    tracing::debug!(event_id = %event.id, kind = %event.kind, ?applied, "event applied");
                }
                Err(err) => {
                    warn!(error = %err, "event feed error; reconnecting");
                    return Ok(());
                }
            }
        }

        warn!("event feed closed; reconnecting");
        Ok(())
    }
}
