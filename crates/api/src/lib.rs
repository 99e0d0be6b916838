//! Caller-facing core API.
//!
//! [`CoreApi`] is the surface the (out-of-scope) web layer embeds: deposit
//! and withdrawal submission, trade-link validation, ledger listings, and
//! the feed checkpoint. It composes the persistence gateway, the external
//! trading client, and the withdrawal coordinator; it owns no state of its
//! own.

pub mod config;

use rust_decimal::Decimal;
use thiserror::Error;

use itemvault_core::{AssetId, EventId, ItemId, OwnerId};
use itemvault_infra::{
    ClientError, InventoryAsset, LedgerStore, StoreError, TradeFilter, TradeRecord, TradingClient,
    WithdrawalCoordinator, WithdrawalError,
};
use itemvault_ledger::{trade_link, Item, ItemState};

/// Why a deposit submission was refused or failed.
#[derive(Debug, Error)]
pub enum DepositError {
    /// The trade link does not encode the requesting owner's identity.
    #[error("trade link does not match the requesting owner")]
    InvalidTradeLink,

    /// An empty asset selection.
    #[error("no assets selected")]
    EmptySelection,

    /// The external service refused or failed the request.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// A user's depositable inventory with its total priced value.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositInventory {
    /// Tradable, priced assets, most valuable first.
    pub assets: Vec<InventoryAsset>,
    pub total: Decimal,
}

/// The core API consumed by the web layer.
#[derive(Debug)]
pub struct CoreApi<S, C> {
    store: S,
    client: C,
    withdrawals: WithdrawalCoordinator<S, C>,
}

impl<S, C> CoreApi<S, C>
where
    S: LedgerStore + Clone,
    C: TradingClient + Clone,
{
    pub fn new(store: S, client: C) -> Self {
        Self {
            withdrawals: WithdrawalCoordinator::new(store.clone(), client.clone()),
            store,
            client,
        }
    }

    /// True iff `link` matches the expected shape and encodes `owner`.
    pub fn validate_trade_link(&self, owner: OwnerId, link: &str) -> bool {
        trade_link::validate_trade_link(owner, link)
    }

    /// Largest durably recorded event id (the feed checkpoint).
    pub async fn current_max_event_id(&self) -> Result<EventId, StoreError> {
        self.store.max_event_id().await
    }

    /// Request a deposit of `asset_ids` to be sent via `trade_link`.
    ///
    /// Validation is synchronous and happens before any external call; the
    /// resulting items enter the ledger only when the completed deposit
    /// event arrives on the feed.
    pub async fn submit_deposit(
        &self,
        owner: OwnerId,
        trade_link: &str,
        asset_ids: &[AssetId],
    ) -> Result<(), DepositError> {
        if asset_ids.is_empty() {
            return Err(DepositError::EmptySelection);
        }
        if !trade_link::validate_trade_link(owner, trade_link) {
            return Err(DepositError::InvalidTradeLink);
        }
        self.client.create_deposit(trade_link, asset_ids).await?;
        Ok(())
    }

    /// Atomically claim `item_ids` for `owner` and request their release.
    pub async fn submit_withdrawal(
        &self,
        owner: OwnerId,
        trade_link: &str,
        item_ids: &[ItemId],
    ) -> Result<(), WithdrawalError> {
        self.withdrawals
            .request_withdrawal(owner, trade_link, item_ids)
            .await
    }

    /// Items currently available for withdrawal by `owner`.
    pub async fn available_items(&self, owner: OwnerId) -> Result<Vec<Item>, StoreError> {
        self.store.items_for_owner(owner, ItemState::Owned).await
    }

    /// The owner's platform inventory, restricted to what can actually be
    /// deposited: tradable assets with a price, most valuable first.
    pub async fn deposit_inventory(&self, owner: OwnerId) -> Result<DepositInventory, ClientError> {
        let mut assets: Vec<InventoryAsset> = self
            .client
            .load_inventory(owner)
            .await?
            .into_iter()
            .filter(|a| a.tradable && a.priced_value.is_some())
            .collect();
        assets.sort_by(|a, b| b.priced_value.cmp(&a.priced_value));

        let total = assets
            .iter()
            .filter_map(|a| a.priced_value)
            .fold(Decimal::ZERO, |acc, v| acc + v);

        Ok(DepositInventory { assets, total })
    }

    /// The owner's trade history, newest first.
    pub async fn list_trades(&self, owner: OwnerId) -> Result<Vec<TradeRecord>, ClientError> {
        self.client
            .list_trades(&TradeFilter {
                owner,
                descending: true,
            })
            .await
    }
}
