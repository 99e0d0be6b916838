//! Withdrawal coordinator: claim ownership of items under row locks, then
//! request fulfillment from the external service.

use thiserror::Error;
use tracing::{debug, error};

use itemvault_core::{ItemId, OwnerId};
use itemvault_ledger::trade_link;

use crate::client::{ClientError, TradingClient};
use crate::store::{LedgerStore, StoreError};

/// Why a withdrawal request was refused or failed.
#[derive(Debug, Error)]
pub enum WithdrawalError {
    /// The trade link does not encode the requesting owner's identity.
    #[error("trade link does not match the requesting owner")]
    InvalidTradeLink,

    /// An empty item selection.
    #[error("no items selected")]
    EmptySelection,

    /// Some requested item is missing, owned by another user, or already
    /// requested. Nothing was changed.
    #[error("items are not available for withdrawal")]
    Unavailable,

    /// The gateway failed; nothing was changed.
    #[error(transparent)]
    Store(StoreError),

    /// The claim committed but the fulfillment call failed; the items
    /// remain `requested` pending manual reconciliation.
    #[error("fulfillment request failed: {0}")]
    Fulfillment(#[source] ClientError),
}

/// Coordinates the claim-then-fulfill withdrawal workflow.
#[derive(Debug)]
pub struct WithdrawalCoordinator<S, C> {
    store: S,
    client: C,
}

impl<S, C> WithdrawalCoordinator<S, C>
where
    S: LedgerStore,
    C: TradingClient,
{
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    /// Atomically claim `item_ids` for `owner` and request their release.
    ///
    /// Validation happens before any transaction opens. The claim is
    /// all-or-nothing: either every item was `owned` by `owner` and is now
    /// `requested`, or nothing changed. The fulfillment call runs only
    /// after the claim commits.
    pub async fn request_withdrawal(
        &self,
        owner: OwnerId,
        trade_link: &str,
        item_ids: &[ItemId],
    ) -> Result<(), WithdrawalError> {
        if item_ids.is_empty() {
            return Err(WithdrawalError::EmptySelection);
        }
        if !trade_link::validate_trade_link(owner, trade_link) {
            return Err(WithdrawalError::InvalidTradeLink);
        }

        match self.store.claim_items(owner, item_ids).await {
            Ok(()) => {}
            Err(StoreError::InsufficientItems {
                requested,
                lockable,
            }) => {
                // A normal rejected request, not a system fault.
                debug!(owner = %owner, requested, lockable, "withdrawal refused: items unavailable");
                return Err(WithdrawalError::Unavailable);
            }
            Err(err) => return Err(WithdrawalError::Store(err)),
        }

        if let Err(err) = self.client.create_withdrawal(trade_link, item_ids).await {
            // No automatic revert: the service may have partially accepted
            // the request, so the rows stay `requested` for an operator to
            // reconcile.
            error!(owner = %owner, items = ?item_ids, error = %err, "fulfillment failed after claim; items remain requested");
            return Err(WithdrawalError::Fulfillment(err));
        }

        Ok(())
    }
}
