//! Feed event model.
//!
//! Events arrive from the external trading service as
//! `{id, type, action, data}` with an opaque JSON payload. Only trade
//! payloads are interpreted further; everything else is recorded as-is so
//! unknown event shapes are logged, not rejected.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use itemvault_core::{EventId, OwnerId};

use crate::item::NewItem;

/// Top-level classifier of a feed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Trade,
    Bot,
    Other(String),
}

impl EventKind {
    /// Stable wire/column form.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Trade => "trades",
            EventKind::Bot => "bots",
            EventKind::Other(s) => s,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "trades" => EventKind::Trade,
            "bots" => EventKind::Bot,
            _ => EventKind::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, ordered record from the external event feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub action: String,
    pub data: JsonValue,
}

/// Sub-classifier of a trade payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Deposit,
    Withdrawal,
    #[serde(other)]
    Other,
}

/// State of a trade as reported by the external service.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    Pending,
    Complete,
    Failed,
    #[serde(other)]
    Other,
}

/// Decoded payload of a trade event.
///
/// Ledger mutation only happens for `kind == Deposit && state == Complete`;
/// all other combinations are recorded without side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePayload {
    #[serde(rename = "type")]
    pub kind: TradeKind,
    pub state: TradeState,
    #[serde(rename = "user_id", deserialize_with = "owner_from_wire")]
    pub owner: OwnerId,
    #[serde(default)]
    pub items: Vec<NewItem>,
}

impl TradePayload {
    /// Decode a raw event payload.
    pub fn from_value(data: &JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(data.clone())
    }
}

/// Owner identities exceed 2^53, so the wire may carry them as strings.
fn owner_from_wire<'de, D>(deserializer: D) -> Result<OwnerId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Num(u64),
        Str(String),
    }

    match Wire::deserialize(deserializer)? {
        Wire::Num(n) => Ok(OwnerId::new(n)),
        Wire::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
