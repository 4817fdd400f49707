//! Core types for the channelcast fan-out engine.
//!
//! Pure data and contracts, no I/O. The server crate wires these into the
//! connection registry, chat log and broadcast router.
//!
//! # Components
//!
//! - [`model`]: Connection and chat log records, day buckets, key layout
//! - [`store`]: Key-value store contract and the item representation
//! - [`push`]: Push contract and delivery outcomes
//! - [`event`]: Inbound event and outbound response shapes
//! - [`env`]: Clock abstraction for deterministic tests
//! - [`error`]: Validation and relay errors

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod event;
pub mod model;
pub mod push;
pub mod store;

pub use env::Environment;
pub use error::{RelayError, ValidationError};
pub use event::{InboundEvent, Response, Route};
pub use model::{BY_TYPE_INDEX, ChatEntry, ChatLog, Connection, DayBucket};
pub use push::{DeliveryOutcome, PushAdapter};
pub use store::{Attribute, Item, ItemKey, SecondaryIndex, StoreAdapter, StoreError};
