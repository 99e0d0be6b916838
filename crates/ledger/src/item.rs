//! Ledger items and their lifecycle.

use chrono::{DateTime, Utc};
use core::str::FromStr;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use itemvault_core::{DomainError, ItemId, OwnerId};

/// Lifecycle state of a ledger item.
///
/// Items are created `Owned` by the reconciliation engine when a completed
/// deposit is processed, and move to `Requested` only under a row lock held
/// by the withdrawal coordinator. Nothing in this core moves them back.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Owned,
    Requested,
}

impl ItemState {
    /// Stable string form used in the `items.state` column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ItemState::Owned => "owned",
            ItemState::Requested => "requested",
        }
    }
}

impl core::fmt::Display for ItemState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owned" => Ok(ItemState::Owned),
            "requested" => Ok(ItemState::Requested),
            other => Err(DomainError::validation(format!(
                "unknown item state '{other}'"
            ))),
        }
    }
}

/// A tradable asset tracked in the local ledger.
///
/// Exactly one owner and one state at any instant; all mutation goes through
/// the persistence gateway under a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub state: ItemState,
    pub owner: OwnerId,
    pub name: String,
    pub quality: String,
    pub icon: String,
    pub inspect_link: Option<String>,
    pub priced_value: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Descriptive attributes of an item about to enter the ledger.
///
/// This is the shape carried per-asset in a completed deposit payload; the
/// gateway fills in state, owner and timestamps at insert time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub inspect_link: Option<String>,
    #[serde(default)]
    pub priced_value: Decimal,
}
