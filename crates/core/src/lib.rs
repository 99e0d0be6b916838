//! Core domain primitives: strongly-typed identifiers and the domain error
//! model. No IO lives here.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, AssetId, EventId, ItemId, OwnerId};
