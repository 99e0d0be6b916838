//! Strongly-typed identifiers used across the system.
//!
//! Every identifier here is assigned by the external trading platform; this
//! service never mints its own ids. Events, items and inventory assets carry
//! signed 64-bit ids on the wire and in the database. Owner identities are
//! the platform's 64-bit encoded form (see [`OwnerId::from_account`]).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a feed event (externally assigned, strictly increasing).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(i64);

/// Identifier of a ledger item (the platform's inventory item id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

/// Identifier of an asset in a user's platform inventory (pre-deposit).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(i64);

macro_rules! impl_i64_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let id = i64::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(id))
            }
        }
    };
}

impl_i64_newtype!(EventId, "EventId");
impl_i64_newtype!(ItemId, "ItemId");
impl_i64_newtype!(AssetId, "AssetId");

/// A 32-bit platform account id, as embedded in trade links.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(u32);

impl AccountId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The platform's 64-bit owner identity.
///
/// The full identity packs a 32-bit universe/type prefix for "individual
/// account" in the high half and the account id in the low half. This
/// encoding must stay bit-exact: it is what ties a trade link's embedded
/// account id back to the identity used everywhere else in the system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(u64);

/// Universe/type prefix constant for individual accounts.
const INDIVIDUAL_ACCOUNT_PREFIX: u64 = 0x0110_0001;

impl OwnerId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Encode a 32-bit account id into the full 64-bit identity.
    pub const fn from_account(account: AccountId) -> Self {
        Self((INDIVIDUAL_ACCOUNT_PREFIX << 32) | account.as_u32() as u64)
    }

    /// Recover the 32-bit account id, if this identity carries the
    /// individual-account prefix.
    pub const fn account(&self) -> Option<AccountId> {
        if self.0 >> 32 == INDIVIDUAL_ACCOUNT_PREFIX {
            Some(AccountId::new(self.0 as u32))
        } else {
            None
        }
    }
}

impl core::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for OwnerId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<OwnerId> for u64 {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

impl FromStr for OwnerId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = u64::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("OwnerId: {}", e)))?;
        Ok(Self(id))
    }
}
