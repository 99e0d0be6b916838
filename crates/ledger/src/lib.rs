//! Domain model for the item ledger: items and their lifecycle states, the
//! feed event model, and the pure trade-link validator.

pub mod event;
pub mod item;
pub mod trade_link;

pub use event::{EventKind, FeedEvent, TradeKind, TradePayload, TradeState};
pub use item::{Item, ItemState, NewItem};
pub use trade_link::{parse_trade_link, validate_trade_link, TradeLink};
